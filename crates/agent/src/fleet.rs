//! Cab fleet capabilities backed by the fleet HTTP service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use fleetchat_core::config::FleetConfig;
use reqwest::Method;
use serde_json::{json, Map, Value};

use crate::tools::{ParamSpec, ParamType, Tool, ToolDescriptor, ToolPresentation, ToolRegistry};

const CAB_ID: ParamType = ParamType::Integer { min: Some(1), max: None };
const CAB_MODEL_NAME: ParamType = ParamType::String { min_len: Some(2), max_len: Some(100) };
const CAB_REG_NAME: ParamType = ParamType::String { min_len: Some(3), max_len: Some(20) };
const LATITUDE: ParamType = ParamType::Float { min: Some(-90.0), max: Some(90.0) };
const LONGITUDE: ParamType = ParamType::Float { min: Some(-180.0), max: Some(180.0) };

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FleetOperation {
    ListCabs,
    AddCab,
    UpdateCab,
    DeleteCab,
    UpdateCabLocation,
    GetCabLocation,
}

impl FleetOperation {
    pub const ALL: [FleetOperation; 6] = [
        Self::ListCabs,
        Self::AddCab,
        Self::UpdateCab,
        Self::DeleteCab,
        Self::UpdateCabLocation,
        Self::GetCabLocation,
    ];

    pub fn descriptor(&self) -> ToolDescriptor {
        match self {
            Self::ListCabs => ToolDescriptor {
                name: "get_all_cabs",
                description: "Fetches all active cabs",
                params: Vec::new(),
                presentation: ToolPresentation::Listing,
                mutating: false,
                requires_any: &[],
            },
            Self::AddCab => ToolDescriptor {
                name: "add_cab",
                description: "Adds a new cab",
                params: vec![
                    ParamSpec::required("cab_model_name", CAB_MODEL_NAME, "model, e.g. Toyota Camry"),
                    ParamSpec::required("cab_reg_name", CAB_REG_NAME, "registration, e.g. TN01AB1234"),
                ],
                presentation: ToolPresentation::Mutation,
                mutating: true,
                requires_any: &[],
            },
            Self::UpdateCab => ToolDescriptor {
                name: "update_cab",
                description: "Updates a cab's model or registration",
                params: vec![
                    ParamSpec::required("cab_id", CAB_ID, "positive cab id"),
                    ParamSpec::optional("cab_model_name", CAB_MODEL_NAME, "new model"),
                    ParamSpec::optional("cab_reg_name", CAB_REG_NAME, "new registration"),
                ],
                presentation: ToolPresentation::Mutation,
                mutating: true,
                requires_any: &["cab_model_name", "cab_reg_name"],
            },
            Self::DeleteCab => ToolDescriptor {
                name: "delete_cab",
                description: "Deletes a cab",
                params: vec![ParamSpec::required("cab_id", CAB_ID, "positive cab id")],
                presentation: ToolPresentation::Mutation,
                mutating: true,
                requires_any: &[],
            },
            Self::UpdateCabLocation => ToolDescriptor {
                name: "update_cab_location",
                description: "Updates a cab's current location",
                params: vec![
                    ParamSpec::required("cab_id", CAB_ID, "positive cab id"),
                    ParamSpec::required("current_lat", LATITUDE, "latitude"),
                    ParamSpec::required("current_lan", LONGITUDE, "longitude"),
                ],
                presentation: ToolPresentation::Mutation,
                mutating: true,
                requires_any: &[],
            },
            Self::GetCabLocation => ToolDescriptor {
                name: "get_cab_location",
                description: "Gets a cab's current location",
                params: vec![ParamSpec::required("cab_id", CAB_ID, "positive cab id")],
                presentation: ToolPresentation::Location,
                mutating: false,
                requires_any: &[],
            },
        }
    }

    /// Method, path and optional JSON body for validated arguments.
    pub fn request(&self, args: &Map<String, Value>) -> Result<(Method, String, Option<Value>)> {
        let request = match self {
            Self::ListCabs => (Method::GET, "/cabs".to_string(), None),
            Self::AddCab => (
                Method::POST,
                "/cabs".to_string(),
                Some(json!({
                    "cab_model_name": args.get("cab_model_name"),
                    "cab_reg_name": args.get("cab_reg_name"),
                })),
            ),
            Self::UpdateCab => {
                let mut body = Map::new();
                for key in ["cab_model_name", "cab_reg_name"] {
                    if let Some(value) = args.get(key) {
                        body.insert(key.to_string(), value.clone());
                    }
                }
                (Method::PUT, format!("/cabs/{}", cab_id(args)?), Some(Value::Object(body)))
            }
            Self::DeleteCab => (Method::DELETE, format!("/cabs/{}", cab_id(args)?), None),
            Self::UpdateCabLocation => (
                Method::PUT,
                format!("/cabs/{}/location", cab_id(args)?),
                Some(json!({
                    "current_lat": args.get("current_lat"),
                    "current_lan": args.get("current_lan"),
                })),
            ),
            Self::GetCabLocation => {
                (Method::GET, format!("/cabs/{}/location", cab_id(args)?), None)
            }
        };
        Ok(request)
    }
}

fn cab_id(args: &Map<String, Value>) -> Result<i64> {
    args.get("cab_id").and_then(Value::as_i64).ok_or_else(|| anyhow!("cab_id is missing"))
}

#[derive(Clone)]
pub struct FleetClient {
    http: reqwest::Client,
    base_url: String,
}

impl FleetClient {
    pub fn from_config(config: &FleetConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build fleet http client")?;
        Ok(Self { http, base_url: config.base_url.trim_end_matches('/').to_string() })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.http.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response =
            request.send().await.with_context(|| format!("{method} {path} could not be sent"))?;
        let status = response.status();
        let text = response.text().await.with_context(|| format!("{method} {path} body"))?;

        if !status.is_success() {
            let detail = error_detail(&text).unwrap_or_else(|| {
                status.canonical_reason().unwrap_or("request failed").to_string()
            });
            bail!("fleet service returned {}: {detail}", status.as_u16());
        }

        if text.trim().is_empty() {
            return Ok(json!({ "status": "success" }));
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

/// Pulls `detail`/`message`/`error` out of an error body.
fn error_detail(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    ["detail", "message", "error"]
        .iter()
        .find_map(|key| parsed.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

pub struct FleetTool {
    operation: FleetOperation,
    descriptor: ToolDescriptor,
    client: Arc<FleetClient>,
}

impl FleetTool {
    pub fn new(operation: FleetOperation, client: Arc<FleetClient>) -> Self {
        Self { descriptor: operation.descriptor(), operation, client }
    }
}

#[async_trait]
impl Tool for FleetTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: &Map<String, Value>) -> Result<Value> {
        let (method, path, body) = self.operation.request(args)?;
        self.client.send(method, &path, body.as_ref()).await
    }
}

pub fn register_fleet_tools(registry: &mut ToolRegistry, client: Arc<FleetClient>) {
    for operation in FleetOperation::ALL {
        registry.register(FleetTool::new(operation, client.clone()));
    }
}
