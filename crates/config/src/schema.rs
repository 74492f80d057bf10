//! The raw, serde-deserialized shape of one `service`/`rule`/`then` block.
//! Kept deliberately minimal — just enough to express the services/rules/
//! dependencies/actions exercised by the test scenarios (spec §4.4a).
//!
//! The control file is walked block-by-block in [`crate::load`] rather than
//! deserialized in one shot, so that a duplicate `service` label can be
//! rejected instead of silently overwritten by a `HashMap`.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ServiceDef {
    pub kind: String,
    pub path: Option<String>,
    pub pidfile: Option<String>,
    #[serde(default)]
    pub start: Option<Vec<String>>,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
    #[serde(default)]
    pub restart: Option<Vec<String>>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RuleDef {
    pub kind: String,
    #[serde(rename = "if")]
    pub operator: String,
    pub threshold: Option<f64>,
    pub text: Option<String>,
    #[serde(default)]
    pub invert: bool,
    pub cycles: Option<u32>,
    pub count: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ActionDef {
    pub kind: String,
    #[serde(default)]
    pub exec: Option<Vec<String>>,
    pub timeout: Option<u64>,
    pub repeat: Option<u32>,
}
