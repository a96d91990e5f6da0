//! Run-length encoded binary masks.
//!
//! Runs are stored in column-major (Fortran) order and always start with a
//! background run, which may be zero-length. This is the uncompressed COCO
//! RLE layout; [`RleMask::from_coco_string`] and [`RleMask::to_coco_string`]
//! handle the compressed string form.

use serde::{Deserialize, Serialize};

use super::geometry::{BBoxXYXY, Pixel};
use crate::error::{AnnosetError, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RleMask {
    pub height: u32,
    pub width: u32,
    pub counts: Vec<u32>,
}

impl RleMask {
    /// Builds a mask from explicit counts, checking they cover the image.
    pub fn new(height: u32, width: u32, counts: Vec<u32>) -> Result<Self> {
        let mask = Self {
            height,
            width,
            counts,
        };
        mask.validate()?;
        Ok(mask)
    }

    /// Encodes a row-major bitmap of `width * height` pixels.
    pub fn from_bitmap(width: u32, height: u32, bitmap: &[bool]) -> Result<Self> {
        let (w, h) = (width as usize, height as usize);
        if bitmap.len() != w * h {
            return Err(AnnosetError::MalformedAnnotation(format!(
                "mask bitmap has {} pixel(s), expected {}x{}",
                bitmap.len(),
                width,
                height
            )));
        }

        let mut counts = Vec::new();
        let mut current = false;
        let mut run: u32 = 0;
        for x in 0..w {
            for y in 0..h {
                let value = bitmap[y * w + x];
                if value != current {
                    counts.push(run);
                    run = 0;
                    current = value;
                }
                run += 1;
            }
        }
        counts.push(run);

        Ok(Self {
            height,
            width,
            counts,
        })
    }

    /// Decodes to a row-major bitmap.
    pub fn to_bitmap(&self) -> Vec<bool> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut bitmap = vec![false; w * h];
        let mut pos = 0usize;
        for (idx, &count) in self.counts.iter().enumerate() {
            let count = count as usize;
            if idx % 2 == 1 {
                for p in pos..(pos + count).min(w * h) {
                    let (x, y) = (p / h, p % h);
                    bitmap[y * w + x] = true;
                }
            }
            pos += count;
        }
        bitmap
    }

    /// Number of foreground pixels.
    pub fn area(&self) -> u64 {
        self.counts
            .iter()
            .skip(1)
            .step_by(2)
            .map(|&c| u64::from(c))
            .sum()
    }

    /// Tight bounding box of the foreground, or `None` for an empty mask.
    pub fn bbox(&self) -> Option<BBoxXYXY<Pixel>> {
        let h = u64::from(self.height);
        if h == 0 {
            return None;
        }
        let mut bounds: Option<(u64, u64, u64, u64)> = None;
        let mut pos = 0u64;
        for (idx, &count) in self.counts.iter().enumerate() {
            let count = u64::from(count);
            if idx % 2 == 1 && count > 0 {
                let start = pos;
                let end = pos + count - 1;
                let (x0, x1) = (start / h, end / h);
                let (y0, y1) = if x0 == x1 {
                    (start % h, end % h)
                } else {
                    (0, h - 1)
                };
                bounds = Some(match bounds {
                    None => (x0, y0, x1, y1),
                    Some((a, b, c, d)) => (a.min(x0), b.min(y0), c.max(x1), d.max(y1)),
                });
            }
            pos += count;
        }
        bounds.map(|(x0, y0, x1, y1)| {
            BBoxXYXY::from_xyxy(x0 as f64, y0 as f64, (x1 + 1) as f64, (y1 + 1) as f64)
        })
    }

    /// Checks that the runs cover exactly `width * height` pixels.
    pub fn validate(&self) -> Result<()> {
        let total: u64 = self.counts.iter().map(|&c| u64::from(c)).sum();
        let expected = u64::from(self.width) * u64::from(self.height);
        if total != expected {
            return Err(AnnosetError::MalformedAnnotation(format!(
                "mask runs cover {total} pixel(s), expected {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Decodes a compressed COCO RLE `counts` string.
    pub fn from_coco_string(counts: &str, height: u32, width: u32) -> Result<Self> {
        let bytes = counts.as_bytes();
        let mut out: Vec<u32> = Vec::new();
        let mut p = 0usize;
        while p < bytes.len() {
            let mut x: i64 = 0;
            let mut k = 0u32;
            let mut more = true;
            while more {
                let Some(&raw) = bytes.get(p) else {
                    return Err(AnnosetError::MalformedAnnotation(
                        "truncated compressed RLE string".to_string(),
                    ));
                };
                let c = i64::from(raw) - 48;
                if !(0..64).contains(&c) || k >= 12 {
                    return Err(AnnosetError::MalformedAnnotation(format!(
                        "invalid character '{}' in compressed RLE string",
                        raw as char
                    )));
                }
                x |= (c & 0x1f) << (5 * k);
                more = c & 0x20 != 0;
                p += 1;
                k += 1;
                if !more && (c & 0x10) != 0 {
                    x |= -1i64 << (5 * k);
                }
            }
            let m = out.len();
            if m > 2 {
                x += i64::from(out[m - 2]);
            }
            let value = u32::try_from(x).map_err(|_| {
                AnnosetError::MalformedAnnotation(format!("negative run length {x} in RLE"))
            })?;
            out.push(value);
        }
        Self::new(height, width, out)
    }

    /// Encodes the counts as a compressed COCO RLE string.
    pub fn to_coco_string(&self) -> String {
        let mut s = String::new();
        for (i, &count) in self.counts.iter().enumerate() {
            let mut x = i64::from(count);
            if i > 2 {
                x -= i64::from(self.counts[i - 2]);
            }
            let mut more = true;
            while more {
                let mut c = x & 0x1f;
                x >>= 5;
                more = if c & 0x10 != 0 { x != -1 } else { x != 0 };
                if more {
                    c |= 0x20;
                }
                s.push((c + 48) as u8 as char);
            }
        }
        s
    }
}
