//! Image configuration documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};
use crate::json::{self, JsonObject};

/// The runtime configuration of a container image.
///
/// The serde form is the normalized camelCase one; Docker's PascalCase
/// documents are read with [`Config::from_map`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Container host name.
    pub host_name: Option<String>,
    /// Container domain name.
    pub domain_name: Option<String>,
    /// User the process runs as.
    pub user: Option<String>,
    /// Attach standard input.
    pub attach_stdin: Option<bool>,
    /// Attach standard output.
    pub attach_stdout: Option<bool>,
    /// Attach standard error.
    pub attach_stderr: Option<bool>,
    /// Allocate a terminal.
    pub tty: Option<bool>,
    /// Environment, as `NAME=value` entries.
    pub env: Vec<String>,
    /// Default arguments.
    pub cmd: Vec<String>,
    /// Image the container was created from.
    pub image: Option<String>,
    /// Working directory of the process.
    pub working_dir: Option<String>,
    /// Entrypoint command.
    pub entrypoint: Vec<String>,
}

impl Config {
    /// Read the Docker-cased `config` object of an image configuration.
    pub fn from_map(object: &JsonObject) -> Self {
        Self {
            host_name: json::string(object, "Hostname"),
            domain_name: json::string(object, "Domainname"),
            user: json::string(object, "User"),
            attach_stdin: json::as_boolean(object.get("AttachStdin")),
            attach_stdout: json::as_boolean(object.get("AttachStdout")),
            attach_stderr: json::as_boolean(object.get("AttachStderr")),
            tty: json::as_boolean(object.get("Tty")),
            env: json::strings(object, "Env"),
            cmd: json::strings(object, "Cmd"),
            image: json::string(object, "Image"),
            working_dir: json::string(object, "WorkingDir"),
            entrypoint: json::strings(object, "Entrypoint"),
        }
    }
}

/// The layer filesystem of an image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rootfs {
    #[serde(rename = "type")]
    /// Filesystem type, normally `layers`.
    pub kind: Option<String>,
    /// Digests of the uncompressed layers, base first.
    pub diff_ids: Vec<String>,
}

impl Rootfs {
    fn from_map(object: &JsonObject) -> Self {
        Self {
            kind: json::string(object, "type"),
            diff_ids: json::strings(object, "diff_ids"),
        }
    }
}

/// An image configuration, whichever manifest schema it came from.
///
/// Registry documents are read with [`ConfigSpec::parse`]; serde
/// round-trips the normalized form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigSpec {
    /// CPU architecture.
    pub architecture: Option<String>,
    /// Runtime configuration.
    pub config: Config,
    /// Container the image was committed from.
    pub container: Option<String>,
    /// Creation time.
    pub created: Option<DateTime<Utc>>,
    /// Layer filesystem.
    pub rootfs: Rootfs,
}

impl ConfigSpec {
    /// Read a decoded configuration document.
    pub fn from_map(object: &JsonObject) -> Self {
        let empty = JsonObject::new();
        Self {
            architecture: json::string(object, "architecture"),
            config: Config::from_map(json::object(object, "config").unwrap_or(&empty)),
            container: json::string(object, "container"),
            created: json::as_instant(object.get("created")),
            rootfs: Rootfs::from_map(json::object(object, "rootfs").unwrap_or(&empty)),
        }
    }

    /// Parse a schema 2 or OCI configuration document.
    pub fn parse(json: &str) -> RegistryResult<Self> {
        Ok(Self::from_map(&json::parse_object(json)?))
    }

    /// Extract the configuration embedded in a schema 1 manifest.
    ///
    /// Schema 1 manifests carry it as a JSON string in the
    /// `v1Compatibility` field of the first `history` entry.
    pub fn parse_v1(manifest: &str) -> RegistryResult<Self> {
        Self::parse_v1_map(&json::parse_object(manifest)?)
    }

    /// Like [`ConfigSpec::parse_v1`], over a decoded manifest.
    pub fn parse_v1_map(manifest: &JsonObject) -> RegistryResult<Self> {
        let compatibility = json::first(manifest, "history")
            .and_then(serde_json::Value::as_object)
            .ok_or_else(|| RegistryError::InvalidManifest("Invalid Docker v1 manifest".into()))?;
        let embedded = json::string(compatibility, "v1Compatibility")
            .ok_or_else(|| RegistryError::InvalidManifest("Invalid Docker v1 manifest".into()))?;
        Self::parse(&embedded)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    const CONFIG: &str = indoc! {r#"
        {
          "architecture": "amd64",
          "config": {
            "Hostname": "",
            "Domainname": "",
            "User": "",
            "AttachStdin": false,
            "AttachStdout": false,
            "AttachStderr": false,
            "Tty": false,
            "Env": ["PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin"],
            "Cmd": ["/bin/sh"],
            "Image": "sha256:9a0f2b1c",
            "WorkingDir": "/work",
            "Entrypoint": null
          },
          "container": "5f1c2d3e",
          "created": "2023-05-09T23:11:10.132147526Z",
          "os": "linux",
          "rootfs": {
            "type": "layers",
            "diff_ids": ["sha256:feb5d9fe", "sha256:0c8c3bd1"]
          }
        }
    "#};

    #[test]
    fn parse_config() {
        let spec = ConfigSpec::parse(CONFIG).unwrap();

        assert_eq!(spec.architecture.as_deref(), Some("amd64"));
        assert_eq!(spec.container.as_deref(), Some("5f1c2d3e"));
        assert_eq!(spec.created.map(|c| c.timestamp()), Some(1_683_673_870));
        assert_eq!(spec.config.cmd, vec!["/bin/sh"]);
        assert_eq!(spec.config.working_dir.as_deref(), Some("/work"));
        assert_eq!(spec.config.attach_stdin, Some(false));
        assert_eq!(spec.config.host_name.as_deref(), Some(""));
        assert!(spec.config.entrypoint.is_empty());
        assert_eq!(spec.rootfs.kind.as_deref(), Some("layers"));
        assert_eq!(spec.rootfs.diff_ids.len(), 2);
    }

    #[test]
    fn normalized_form_round_trips() {
        let spec = ConfigSpec::parse(CONFIG).unwrap();
        let encoded = serde_json::to_string(&spec).unwrap();
        assert!(encoded.contains(r#""workingDir":"/work""#));

        let decoded: ConfigSpec = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, spec);

        let sparse: ConfigSpec =
            serde_json::from_str(r#"{"architecture":"arm64","config":{"cmd":["sh"]}}"#).unwrap();
        assert_eq!(sparse.config.cmd, vec!["sh"]);
        assert!(sparse.config.env.is_empty());
        assert!(sparse.rootfs.diff_ids.is_empty());
    }

    #[test]
    fn absent_sections_default() {
        let spec = ConfigSpec::parse("{}").unwrap();
        assert_eq!(spec, ConfigSpec::default());
    }

    #[test]
    fn parse_v1_history() {
        let manifest = serde_json::json!({
            "schemaVersion": 1,
            "history": [
                {"v1Compatibility": CONFIG},
                {"v1Compatibility": "{\"architecture\":\"arm64\"}"}
            ]
        })
        .to_string();

        let spec = ConfigSpec::parse_v1(&manifest).unwrap();
        assert_eq!(spec, ConfigSpec::parse(CONFIG).unwrap());
    }

    #[test]
    fn parse_v1_requires_history() {
        for manifest in [
            r#"{"schemaVersion": 1}"#,
            r#"{"schemaVersion": 1, "history": []}"#,
            r#"{"schemaVersion": 1, "history": [null, {"v1Compatibility": "{}"}]}"#,
        ] {
            let err = ConfigSpec::parse_v1(manifest).unwrap_err();
            assert!(matches!(err, RegistryError::InvalidManifest(ref msg) if msg == "Invalid Docker v1 manifest"));
        }

        let err = ConfigSpec::parse_v1(r#"{"history": [{"v1Compatibility": "{broken"}]}"#).unwrap_err();
        assert!(matches!(err, RegistryError::Parse { .. }));
    }
}
