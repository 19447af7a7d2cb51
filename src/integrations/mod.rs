//! External service integrations.

pub mod geocoder {
    pub use crate::geocoder::*;
}
