//! Saving and loading pool contents.

use crate::error::Result;
use crate::proxy::ProxyRecord;

use log::warn;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Storage for the records of a pool.
pub trait Persistence: Send + Sync {
    /// Load every record stored at `location`. Nothing stored yet is an empty list.
    fn load(&self, location: &Path) -> Result<Vec<ProxyRecord>>;

    /// Replace whatever is stored at `location` with `records`.
    fn save(&self, location: &Path, records: &[ProxyRecord]) -> Result<()>;
}

/// Records as a pretty-printed JSON array.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFile;

impl Persistence for JsonFile {
    fn load(&self, location: &Path) -> Result<Vec<ProxyRecord>> {
        if !location.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(location)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let entries: Vec<Value> = serde_json::from_str(&content)?;
        let total = entries.len();
        let mut records = Vec::with_capacity(total);
        for entry in entries {
            match serde_json::from_value::<ProxyRecord>(entry) {
                Ok(mut record) => {
                    if record.times_failed_in_row > record.times_failed {
                        warn!(
                            "Clamping failure streak of {} from {} to {}",
                            record.address, record.times_failed_in_row, record.times_failed
                        );
                        record.times_failed_in_row = record.times_failed;
                    }
                    records.push(record);
                }
                Err(e) => warn!("Skipping stored proxy in {}: {}", location.display(), e),
            }
        }
        if records.len() < total {
            warn!(
                "Loaded {} of {} stored proxies from {}",
                records.len(),
                total,
                location.display()
            );
        }
        Ok(records)
    }

    fn save(&self, location: &Path, records: &[ProxyRecord]) -> Result<()> {
        if let Some(parent) = location.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(records)?;
        fs::write(location, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::proxy::{Protocol, ProxyAddress};

    #[test]
    fn test_round_trip_keeps_zero_counters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("proxies.json");

        let mut used = ProxyRecord::new("socks5://1.2.3.4:1080".parse().unwrap()).with_country("NL");
        used.times_succeeded = 4;
        used.times_failed = 2;
        used.times_failed_in_row = 1;
        let fresh = ProxyRecord::new("http://5.6.7.8:80".parse().unwrap());

        JsonFile.save(&path, &[used.clone(), fresh.clone()]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"times_failed_in_row\": 0"));
        assert!(content.contains("\"anonymity\": null"));

        let loaded = JsonFile.load(&path).unwrap();
        assert_eq!(loaded, vec![used, fresh]);
    }

    #[test]
    fn test_missing_and_empty_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxies.json");
        assert!(JsonFile.load(&path).unwrap().is_empty());

        fs::write(&path, "  \n").unwrap();
        assert!(JsonFile.load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_bad_entries_are_skipped_one_by_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxies.json");
        fs::write(
            &path,
            r#"[
                {"address": "http://10.0.0.1:80", "country": "DE", "anonymity": null},
                {"address": "http://::1:8080", "country": null, "anonymity": null},
                {"address": "gopher://10.0.0.2:70", "country": null, "anonymity": null},
                {"country": "US"},
                {"address": "socks5://10.0.0.3:1080", "country": null, "anonymity": null,
                 "times_succeeded": 1, "times_failed": 2, "times_failed_in_row": 1}
            ]"#,
        )
        .unwrap();

        let loaded = JsonFile.load(&path).unwrap();
        let keys: Vec<String> = loaded.iter().map(ProxyRecord::key).collect();
        assert_eq!(keys, vec!["http://10.0.0.1:80", "socks5://10.0.0.3:1080"]);
        assert_eq!(loaded[1].times_failed_in_row, 1);
    }

    #[test]
    fn test_impossible_streak_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxies.json");
        fs::write(
            &path,
            r#"[{"address": "http://10.0.0.1:80", "country": null, "anonymity": null,
                 "times_succeeded": 3, "times_failed": 1, "times_failed_in_row": 7}]"#,
        )
        .unwrap();

        let loaded = JsonFile.load(&path).unwrap();
        assert_eq!(loaded[0].times_failed, 1);
        assert_eq!(loaded[0].times_failed_in_row, 1);
    }

    #[test]
    fn test_ipv6_record_survives_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxies.json");
        let v4 = ProxyRecord::new("http://10.0.0.1:80".parse().unwrap());
        let v6 = ProxyRecord::new(ProxyAddress::new(Protocol::Http, "::1", 8080).unwrap());

        JsonFile.save(&path, &[v4.clone(), v6.clone()]).unwrap();
        assert_eq!(JsonFile.load(&path).unwrap(), vec![v4, v6]);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxies.json");
        fs::write(&path, "[{\"address\": ").unwrap();
        assert!(matches!(JsonFile.load(&path), Err(Error::Json(_))));
    }
}
