pub mod collect;
pub mod currency;

pub use collect::{HttpTransport, Transport};
pub use currency::CurrencyConverter;
