pub mod logging;
pub mod web_adapters;
