//! Configuration access port trait.
//!
//! Typed getters return `Ok(None)` for a missing or blank key and `Err` with a
//! reason when the value is present but cannot be read as that type.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_double(&self, section: &str, key: &str) -> Result<Option<f64>, String>;
    fn get_uint(&self, section: &str, key: &str) -> Result<Option<u64>, String>;
    fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>, String>;
}
