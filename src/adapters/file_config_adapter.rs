//! INI file configuration adapter.

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    fn raw(&self, section: &str, key: &str) -> Option<String> {
        self.config
            .get(section, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_double(&self, section: &str, key: &str) -> Result<Option<f64>, String> {
        match self.raw(section, key) {
            None => Ok(None),
            Some(raw) => self
                .config
                .getfloat(section, key)
                .map_err(|_| format!("'{raw}' is not a number")),
        }
    }

    fn get_uint(&self, section: &str, key: &str) -> Result<Option<u64>, String> {
        match self.raw(section, key) {
            None => Ok(None),
            Some(raw) => self
                .config
                .getuint(section, key)
                .map_err(|_| format!("'{raw}' is not a non-negative integer")),
        }
    }

    fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>, String> {
        match self.raw(section, key) {
            None => Ok(None),
            Some(raw) => self
                .config
                .getboolcoerce(section, key)
                .map_err(|_| format!("'{raw}' is not a boolean")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[backtest]
data = data/btc_eth_15m.csv
ratio = 15.2

[signal]
source = spread
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("backtest", "data"),
            Some("data/btc_eth_15m.csv".to_string())
        );
        assert_eq!(
            adapter.get_string("signal", "source"),
            Some("spread".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[backtest]\nratio = 1\n").unwrap();
        assert_eq!(adapter.get_string("backtest", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_uint_reads_counts() {
        let adapter =
            FileConfigAdapter::from_string("[sweep]\nmax_freq = 48\nworkers = many\nlag = -2\n")
                .unwrap();
        assert_eq!(adapter.get_uint("sweep", "max_freq"), Ok(Some(48)));
        assert_eq!(adapter.get_uint("sweep", "missing"), Ok(None));
        assert!(adapter.get_uint("sweep", "workers").unwrap_err().contains("'many'"));
        assert!(adapter.get_uint("sweep", "lag").is_err());
    }

    #[test]
    fn get_double_rejects_malformed_values() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\nfee_rate = 0.0005\nratio = x\nbase_qty =\n")
                .unwrap();
        assert_eq!(adapter.get_double("backtest", "fee_rate"), Ok(Some(0.0005)));
        assert_eq!(
            adapter.get_double("backtest", "ratio"),
            Err("'x' is not a number".to_string())
        );
        assert_eq!(adapter.get_double("backtest", "base_qty"), Ok(None));
        assert_eq!(adapter.get_double("backtest", "missing"), Ok(None));
    }

    #[test]
    fn get_bool_accepts_common_spellings() {
        let adapter = FileConfigAdapter::from_string(
            "[backtest]\na = true\nb = no\nc = 1\nd = Off\ne = maybe\n",
        )
        .unwrap();
        assert_eq!(adapter.get_bool("backtest", "a"), Ok(Some(true)));
        assert_eq!(adapter.get_bool("backtest", "b"), Ok(Some(false)));
        assert_eq!(adapter.get_bool("backtest", "c"), Ok(Some(true)));
        assert_eq!(adapter.get_bool("backtest", "d"), Ok(Some(false)));
        assert!(adapter.get_bool("backtest", "e").is_err());
        assert_eq!(adapter.get_bool("backtest", "missing"), Ok(None));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[output]\ndir = /tmp/pairtrader\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("output", "dir"),
            Some("/tmp/pairtrader".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        assert!(FileConfigAdapter::from_file("/nonexistent/path/config.ini").is_err());
    }
}
