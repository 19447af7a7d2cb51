//! Persistence: the lead store, the geocode cache file and spreadsheet input.

pub mod db {
    pub use crate::db::*;
}

pub mod db_storage {
    pub use crate::db_storage::*;
}

pub mod geocache {
    pub use crate::geocache::*;
}

pub mod spreadsheet {
    pub use crate::spreadsheet::*;
}
