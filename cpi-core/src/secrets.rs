//! Credentials form and the secrets file synthesized from it.

use crate::errors::{InstallerError, InstallerResult};
use serde::Serialize;
use serde_json::{Map, Value};

/// Brightness written when the form value is not a number.
pub const DEFAULT_BRIGHTNESS: f64 = 0.2;

/// Fields collected by the credentials dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialField {
    NetworkSsid,
    NetworkPassword,
    WebWorkflowPassword,
    StatusPixelBrightness,
}

impl CredentialField {
    pub fn all() -> &'static [CredentialField] {
        &[
            CredentialField::NetworkSsid,
            CredentialField::NetworkPassword,
            CredentialField::WebWorkflowPassword,
            CredentialField::StatusPixelBrightness,
        ]
    }

    /// Fields shown in the credentials dialog.
    pub fn editable() -> &'static [CredentialField] {
        &[
            CredentialField::NetworkSsid,
            CredentialField::NetworkPassword,
            CredentialField::WebWorkflowPassword,
        ]
    }

    /// Location of the value inside the secrets file.
    pub fn path(&self) -> &'static [&'static str] {
        match self {
            CredentialField::NetworkSsid => &["network_type_wifi", "network_ssid"],
            CredentialField::NetworkPassword => &["network_type_wifi", "network_password"],
            CredentialField::WebWorkflowPassword => &["web_workflow_password"],
            CredentialField::StatusPixelBrightness => &["status_pixel_brightness"],
        }
    }

    /// Dotted form of [`path`](Self::path), also used as the input id.
    pub fn id(&self) -> String {
        self.path().join(".")
    }

    pub fn label(&self) -> &'static str {
        match self {
            CredentialField::NetworkSsid => "WiFi Network Name (SSID)",
            CredentialField::NetworkPassword => "WiFi Password",
            CredentialField::WebWorkflowPassword => "Web Workflow Password",
            CredentialField::StatusPixelBrightness => "Status Pixel Brightness",
        }
    }

    /// Blank values are still written for these.
    pub fn may_be_blank(&self) -> bool {
        matches!(self, CredentialField::NetworkPassword)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialForm {
    pub network_ssid: String,
    pub network_password: String,
    pub web_workflow_password: String,
    pub status_pixel_brightness: String,
}

impl CredentialForm {
    pub fn get(&self, field: CredentialField) -> &str {
        match field {
            CredentialField::NetworkSsid => &self.network_ssid,
            CredentialField::NetworkPassword => &self.network_password,
            CredentialField::WebWorkflowPassword => &self.web_workflow_password,
            CredentialField::StatusPixelBrightness => &self.status_pixel_brightness,
        }
    }

    pub fn set(&mut self, field: CredentialField, value: impl Into<String>) {
        let slot = match field {
            CredentialField::NetworkSsid => &mut self.network_ssid,
            CredentialField::NetworkPassword => &mut self.network_password,
            CredentialField::WebWorkflowPassword => &mut self.web_workflow_password,
            CredentialField::StatusPixelBrightness => &mut self.status_pixel_brightness,
        };
        *slot = value.into();
    }

    /// Fields that will be written: non-empty ones, plus those allowed blank.
    pub fn get_valid_fields(&self) -> Vec<CredentialField> {
        CredentialField::all()
            .iter()
            .copied()
            .filter(|field| field.may_be_blank() || !self.get(*field).is_empty())
            .collect()
    }

    /// SSID and web workflow password are required; the WiFi password is not.
    pub fn is_ready(&self) -> bool {
        !self.network_ssid.is_empty() && !self.web_workflow_password.is_empty()
    }
}

/// A secrets file being filled in, backed by its JSON template.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretsFile {
    root: Map<String, Value>,
}

impl SecretsFile {
    pub fn empty() -> Self {
        Self { root: Map::new() }
    }

    pub fn from_template(text: &str) -> InstallerResult<Self> {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(root)) => Ok(Self { root }),
            Ok(_) => Err(InstallerError::InvalidSettings(
                "secrets template is not a JSON object".to_string(),
            )),
            Err(e) => Err(InstallerError::InvalidSettings(format!(
                "secrets template is not valid JSON: {}",
                e
            ))),
        }
    }

    pub fn set_network_ssid(&mut self, ssid: &str) {
        self.set(CredentialField::NetworkSsid, Value::from(ssid));
    }

    pub fn set_network_password(&mut self, password: &str) {
        self.set(CredentialField::NetworkPassword, Value::from(password));
    }

    pub fn set_web_workflow_password(&mut self, password: &str) {
        self.set(CredentialField::WebWorkflowPassword, Value::from(password));
    }

    pub fn set_status_pixel_brightness(&mut self, brightness: f64) {
        self.set(CredentialField::StatusPixelBrightness, Value::from(brightness));
    }

    pub fn get(&self, field: CredentialField) -> Option<&Value> {
        let (last, parents) = field.path().split_last()?;
        let mut node = &self.root;
        for key in parents {
            node = node.get(*key)?.as_object()?;
        }
        node.get(*last)
    }

    /// Apply one form field, converting brightness to a number.
    pub fn apply(&mut self, field: CredentialField, raw: &str) {
        match field {
            CredentialField::StatusPixelBrightness => {
                let brightness = raw
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|value| value.is_finite())
                    .unwrap_or(DEFAULT_BRIGHTNESS);
                self.set_status_pixel_brightness(brightness);
            }
            CredentialField::NetworkSsid => self.set_network_ssid(raw),
            CredentialField::NetworkPassword => self.set_network_password(raw),
            CredentialField::WebWorkflowPassword => self.set_web_workflow_password(raw),
        }
    }

    fn set(&mut self, field: CredentialField, value: Value) {
        let Some((last, parents)) = field.path().split_last() else {
            return;
        };
        let mut node = &mut self.root;
        for key in parents {
            let child = node
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            node = match child {
                Value::Object(map) => map,
                _ => return,
            };
        }
        node.insert(last.to_string(), value);
    }

    /// Serialized with four-space indentation.
    pub fn to_pretty_string(&self) -> InstallerResult<String> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.root
            .serialize(&mut serializer)
            .map_err(|e| InstallerError::InvalidSettings(e.to_string()))?;
        String::from_utf8(out).map_err(|e| InstallerError::InvalidSettings(e.to_string()))
    }
}

/// Fill a secrets template from the form and return the file contents.
pub fn populate_secrets_file(template: &str, form: &CredentialForm) -> InstallerResult<String> {
    let mut secrets = SecretsFile::from_template(template)?;
    for field in form.get_valid_fields() {
        secrets.apply(field, form.get(field));
    }
    secrets.to_pretty_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(ssid: &str, password: &str, web: &str) -> CredentialForm {
        CredentialForm {
            network_ssid: ssid.to_string(),
            network_password: password.to_string(),
            web_workflow_password: web.to_string(),
            status_pixel_brightness: String::new(),
        }
    }

    #[test]
    fn readiness_requires_ssid_and_web_workflow_password() {
        assert!(!form("", "", "").is_ready());
        assert!(form("home", "", "x").is_ready());
        assert!(!form("", "x", "x").is_ready());
        assert!(!form("home", "x", "").is_ready());
    }

    #[test]
    fn blank_password_is_still_a_valid_field() {
        let fields = form("home", "", "").get_valid_fields();
        assert_eq!(
            fields,
            vec![CredentialField::NetworkSsid, CredentialField::NetworkPassword]
        );
    }

    #[test]
    fn populate_creates_nested_keys_and_keeps_template_values() {
        let template = r#"{"other": {"keep": true}}"#;
        let text = populate_secrets_file(template, &form("home", "", "pw")).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["network_type_wifi"]["network_ssid"], "home");
        assert_eq!(value["network_type_wifi"]["network_password"], "");
        assert_eq!(value["web_workflow_password"], "pw");
        assert_eq!(value["other"]["keep"], true);
        assert!(value.get("status_pixel_brightness").is_none());
        assert!(text.contains("\n    \"other\""));
    }

    #[test]
    fn brightness_parses_as_float_with_fallback() {
        let mut f = form("home", "", "pw");
        f.status_pixel_brightness = "0.5".to_string();
        let value: Value =
            serde_json::from_str(&populate_secrets_file("{}", &f).unwrap()).unwrap();
        assert_eq!(value["status_pixel_brightness"], 0.5);

        for raw in ["bright", "nan", "inf", "-inf"] {
            f.status_pixel_brightness = raw.to_string();
            let value: Value =
                serde_json::from_str(&populate_secrets_file("{}", &f).unwrap()).unwrap();
            assert_eq!(value["status_pixel_brightness"], DEFAULT_BRIGHTNESS, "{}", raw);
        }
    }

    #[test]
    fn scalar_in_the_way_is_replaced_by_object() {
        let mut secrets = SecretsFile::from_template(r#"{"network_type_wifi": "legacy"}"#).unwrap();
        secrets.set_network_ssid("home");
        assert_eq!(
            secrets.get(CredentialField::NetworkSsid),
            Some(&Value::from("home"))
        );
    }

    #[test]
    fn non_object_template_is_rejected() {
        assert!(SecretsFile::from_template("[]").is_err());
        assert!(SecretsFile::from_template("{").is_err());
    }
}
