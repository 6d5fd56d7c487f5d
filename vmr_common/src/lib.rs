mod som;

pub mod op;

pub use som::{Som, SomConversionError, UZS_CURRENCY_CODE, UZS_CURRENCY_CODE_LOWER};
