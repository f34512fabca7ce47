//! Offline catalog and bundles used with `--simulate`.

use crate::bundle::write_bundle;
use crate::catalog::{BoardFirmwareEntry, BoardSettings, Catalog, StructureMap};
use crate::errors::InstallerResult;
use crate::firmware_source::StaticFirmwareSource;
use cpi_hal::ChipFamily;

pub const DEMO_SEMVER: &str = "8.0.0";

const SECRETS_TEMPLATE: &str = r#"{
    "network_type_wifi": {
        "network_ssid": "",
        "network_password": ""
    },
    "web_workflow_password": "",
    "status_pixel_brightness": 0.2
}"#;

pub fn demo_board_id(chip: ChipFamily) -> String {
    format!("simulated_{}", chip.esptool_id())
}

/// One simulated board per chip family.
pub fn demo_catalog() -> Catalog {
    let firmwares = ChipFamily::all()
        .iter()
        .map(|chip| BoardFirmwareEntry {
            id: demo_board_id(*chip),
            name: format!("Simulated {} board", chip),
            chip_family: *chip,
            settings: BoardSettings {
                offset: "0x2d0000".to_string(),
                structure: [("0x1000", "boot-VERSION.bin"), ("0x8000", "app-VERSION.bin")]
                    .into_iter()
                    .collect::<StructureMap>(),
                uf2: Some("firmware-VERSION.uf2".to_string()),
            },
        })
        .collect();
    Catalog {
        semver: DEMO_SEMVER.to_string(),
        firmwares,
    }
}

/// Zip contents every simulated board shares.
pub fn demo_bundle() -> InstallerResult<Vec<u8>> {
    let boot = vec![0xe9u8; 4 * 1024];
    let app = vec![0x5au8; 64 * 1024];
    let uf2 = vec![0x55u8; 32 * 1024];
    write_bundle(&[
        ("boot-8.0.0.bin", boot.as_slice()),
        ("app-8.0.0.bin", app.as_slice()),
        ("firmware-8.0.0.uf2", uf2.as_slice()),
        ("files/secrets.json", SECRETS_TEMPLATE.as_bytes()),
    ])
}

pub fn demo_source() -> InstallerResult<StaticFirmwareSource> {
    let catalog = demo_catalog();
    let bundle = demo_bundle()?;
    let ids: Vec<String> = catalog.firmwares.iter().map(|f| f.id.clone()).collect();
    let mut source = StaticFirmwareSource::new(catalog);
    for id in ids {
        source = source.with_bundle(&id, bundle.clone());
    }
    Ok(source)
}
