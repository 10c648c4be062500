pub mod kite;
pub mod yahoo;

pub use kite::KiteClient;
pub use yahoo::YahooClient;
