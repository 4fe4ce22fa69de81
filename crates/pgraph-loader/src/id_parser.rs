//! Internal vertex id layout.
//!
//! A vid packs `(fid, label, offset)` into one `u64`, most significant first:
//!
//! ```text
//! | fid: fid_width | label: label_width | offset: remaining bits |
//! ```
//!
//! `fid_width` is the number of bits needed for `fnum - 1` and `label_width`
//! the number needed for `label_num - 1`, each at least one bit.

use pgraph_comm::Fid;
use serde::{Deserialize, Serialize};

use crate::error::{LoadError, Result};
use crate::{LabelId, Vid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdParser {
    fid_offset: u32,
    label_offset: u32,
    label_mask: u64,
    offset_mask: u64,
}

fn bit_width(count: u64) -> u32 {
    if count <= 1 {
        1
    } else {
        u64::BITS - (count - 1).leading_zeros()
    }
}

impl IdParser {
    pub fn new(fnum: Fid, label_num: usize) -> Self {
        let fid_width = bit_width(fnum as u64);
        let label_width = bit_width(label_num as u64);
        let fid_offset = u64::BITS - fid_width;
        let label_offset = fid_offset - label_width;
        Self {
            fid_offset,
            label_offset,
            label_mask: (1u64 << label_width) - 1,
            offset_mask: (1u64 << label_offset) - 1,
        }
    }

    pub fn generate_id(&self, fid: Fid, label: LabelId, offset: u64) -> Result<Vid> {
        if offset > self.offset_mask {
            return Err(LoadError::Invalid(format!(
                "vertex offset {offset} exceeds the id space ({} bits)",
                self.label_offset
            )));
        }
        Ok(((fid as u64) << self.fid_offset)
            | ((label as u64 & self.label_mask) << self.label_offset)
            | offset)
    }

    pub fn get_fid(&self, vid: Vid) -> Fid {
        (vid >> self.fid_offset) as Fid
    }

    pub fn get_label(&self, vid: Vid) -> LabelId {
        ((vid >> self.label_offset) & self.label_mask) as LabelId
    }

    pub fn get_offset(&self, vid: Vid) -> u64 {
        vid & self.offset_mask
    }

    pub fn max_offset(&self) -> u64 {
        self.offset_mask
    }
}
