//! Configuration loading is visible in the log output.

use std::fs;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use phc::logging;
use phc_config::ConfigProvider;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn config_load_is_logged_then_configured_filter_applies() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("phc.toml"), "[log]\nfilter = \"warn\"\n").unwrap();

    let captured = Captured::default();
    let writer = {
        let captured = captured.clone();
        move || captured.clone()
    };
    let (subscriber, handle) = logging::subscriber(EnvFilter::new("info"), writer);

    tracing::subscriber::with_default(subscriber, || {
        let config = ConfigProvider::new()
            .with_search_dir(dir.path())
            .load()
            .unwrap();
        logging::apply_configured(&handle, &config.log.filter);
        tracing::info!("below the configured level");
        tracing::warn!("at the configured level");
    });

    let output = captured.text();
    assert!(output.contains("Loaded configuration"), "{output}");
    assert!(!output.contains("below the configured level"), "{output}");
    assert!(output.contains("at the configured level"), "{output}");
}

#[test]
fn debug_flag_wins_over_environment() {
    let filter = logging::explicit_filter(true).unwrap();
    assert!(filter.to_string().contains("phc_entity=debug"));
}
