use clap::Parser;
use cpi_core::bundle::{write_bundle, FirmwareBundle};
use cpi_core::cli::Cli;
use cpi_core::config::{FileConfig, InstallerConfig};
use cpi_core::firmware_source::{FirmwareSource, HttpFirmwareSource};
use cpi_core::InstallerError;
use httpmock::Method::GET;
use httpmock::MockServer;
use url::Url;

const CATALOG: &str = r#"{
    "semver": "8.0.0",
    "firmwares": [{
        "id": "feather_s3",
        "name": "Adafruit Feather ESP32-S3",
        "chipFamily": "ESP32-S3",
        "settings": {"offset": "0x2d0000", "structure": {"0x0": "combined-VERSION.bin"}}
    }]
}"#;

fn source(server: &MockServer) -> HttpFirmwareSource {
    let base = Url::parse(&server.url("/cp")).unwrap();
    let catalog = Url::parse(&server.url("/cp/firmware.json")).unwrap();
    HttpFirmwareSource::new(Some(catalog), Some(base), 5).unwrap()
}

#[test]
fn catalog_is_fetched_and_parsed() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/cp/firmware.json");
        then.status(200)
            .header("content-type", "application/json")
            .body(CATALOG);
    });
    let catalog = source(&server).fetch_catalog().unwrap();
    mock.assert();
    assert_eq!(catalog.semver, "8.0.0");
    assert_eq!(catalog.firmwares[0].id, "feather_s3");
}

#[test]
fn bundle_request_asks_for_octet_stream() {
    let server = MockServer::start();
    let zip = write_bundle(&[("combined-8.0.0.bin", b"\xe9firmware")]).unwrap();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/cp/releases/feather_s3")
            .header("accept", "application/octet-stream");
        then.status(200).body(zip.clone());
    });
    let bytes = source(&server).fetch_bundle("feather_s3").unwrap();
    mock.assert();
    let bundle = FirmwareBundle::from_bytes(bytes).unwrap();
    assert_eq!(bundle.find_in_zip("combined-VERSION.bin"), Some("combined-8.0.0.bin"));
}

#[test]
fn http_failure_surfaces_as_fetch_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/cp/releases/missing");
        then.status(404);
    });
    match source(&server).fetch_bundle("missing") {
        Err(InstallerError::Fetch(msg)) => assert!(msg.contains("404"), "{}", msg),
        other => panic!("unexpected: {:?}", other.map(|b| b.len())),
    }
}

#[test]
fn missing_urls_are_lookup_errors() {
    let src = HttpFirmwareSource::new(None, None, 5).unwrap();
    assert!(matches!(src.fetch_catalog(), Err(InstallerError::CatalogLookup(_))));
    assert!(matches!(src.fetch_bundle("x"), Err(InstallerError::CatalogLookup(_))));
}

#[test]
fn configured_source_uses_the_firmware_server_layout() {
    let server = MockServer::start();
    let catalog_mock = server.mock(|when, then| {
        when.method(GET).path("/cp/firmware.json");
        then.status(200).body(CATALOG);
    });
    let bundle_mock = server.mock(|when, then| {
        when.method(GET).path("/cp/releases/feather_s3");
        then.status(200).body("zip");
    });

    let firmware = server.url("/cp");
    let cli = Cli::try_parse_from(["cpinstaller", "--firmware", &firmware, "--fetch-timeout", "5"])
        .unwrap();
    let config = InstallerConfig::resolve(&cli, FileConfig::default()).unwrap();
    assert_eq!(config.fetch_timeout_secs, 5);

    let src = HttpFirmwareSource::from_config(&config).unwrap();
    assert_eq!(src.fetch_catalog().unwrap().firmwares.len(), 1);
    assert_eq!(src.fetch_bundle("feather_s3").unwrap(), b"zip");
    catalog_mock.assert();
    bundle_mock.assert();
}
