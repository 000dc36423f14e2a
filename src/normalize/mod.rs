//! Pure conversions from scraped text into canonical field values.
//!
//! Every function here is total: unparseable input yields `None`, never a
//! panic or an error. Callers decide on fallbacks (a missing date becomes
//! "today", for example).

pub mod date;
pub mod image;
pub mod price;
pub mod text;
pub mod time;

pub use date::{normalize_date, split_timestamp, REFERENCE_TZ};
pub use image::{first_image_url, select_image, IMAGE_SIZE_PRIORITY};
pub use price::{format_price, price_from_json, prices_in_text};
pub use text::{clean_text, normalize_description, MAX_DESCRIPTION_CHARS};
pub use time::normalize_time;
