pub mod avcc;
pub mod nal;
pub mod rewrite;

pub use avcc::AvcDecoderConfig;
pub use nal::{
    contains_idr, find_parameter_sets, split_annexb, split_avcc, NalError, NalUnitType, START_CODE,
};
pub use rewrite::{rewrite_access_unit, RewriteOptions};
