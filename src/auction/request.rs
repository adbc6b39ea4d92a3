use crate::config::{PlacementConfig, SdkConfig};
use crate::types::AdType;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Supplies the device/app/user/regs blocks of a bid request.
///
/// The engine never inspects these; consent strings and device signals are
/// assembled by the host.
pub trait RequestContextProvider: Send + Sync {
    fn app(&self) -> Value;
    fn device(&self) -> Value;
    fn user(&self) -> Value;
    fn regs(&self) -> Value;
}

/// Context built once from the SDK configuration
#[derive(Debug, Clone)]
pub struct StaticContext {
    app: Value,
    device: Value,
    user: Value,
    regs: Value,
}

impl StaticContext {
    pub fn from_config(sdk: &SdkConfig) -> Self {
        Self {
            app: json!({
                "bundle": sdk.app_bundle.clone().unwrap_or_default(),
                "publisher": { "id": sdk.publisher_id },
            }),
            device: json!({
                "os": std::env::consts::OS,
                "ifa": "00000000-0000-0000-0000-000000000000",
            }),
            user: json!({ "id": sdk.user_id.clone().unwrap_or_default() }),
            regs: json!({}),
        }
    }
}

impl RequestContextProvider for StaticContext {
    fn app(&self) -> Value {
        self.app.clone()
    }

    fn device(&self) -> Value {
        self.device.clone()
    }

    fn user(&self) -> Value {
        self.user.clone()
    }

    fn regs(&self) -> Value {
        self.regs.clone()
    }
}

/// OpenRTB-shaped bid request body
#[derive(Debug, Clone, Serialize)]
pub struct BidRequest {
    pub id: String,
    pub imp: Vec<Impression>,
    pub app: Value,
    pub device: Value,
    pub user: Value,
    pub regs: Value,
    /// Deadline the server must answer within, in milliseconds
    pub tmax: u64,
    pub ext: RequestExt,
}

#[derive(Debug, Clone, Serialize)]
pub struct Impression {
    pub id: String,
    pub tagid: String,
    pub bidfloor: f64,
    pub instl: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native: Option<Value>,
    pub ext: ImpressionExt,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImpressionExt {
    pub adtype: AdType,
    pub placement_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestExt {
    pub publisher_id: String,
    /// Adapter name -> bidder token key/values
    pub adapter_info: HashMap<String, HashMap<String, String>>,
}

/// Assembles bid requests for placements
pub struct BidRequestBuilder {
    context: Arc<dyn RequestContextProvider>,
    publisher_id: String,
    bid_floor: f64,
}

impl BidRequestBuilder {
    pub fn new(
        context: Arc<dyn RequestContextProvider>,
        publisher_id: impl Into<String>,
        bid_floor: f64,
    ) -> Self {
        Self {
            context,
            publisher_id: publisher_id.into(),
            bid_floor,
        }
    }

    pub fn build(
        &self,
        placement: &PlacementConfig,
        adapter_info: HashMap<String, HashMap<String, String>>,
        tmax: Duration,
    ) -> BidRequest {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (banner, native) = match placement.ad_type {
            AdType::Banner => (Some(json!({ "w": 320, "h": 50 })), None),
            AdType::Mrec => (Some(json!({ "w": 300, "h": 250 })), None),
            AdType::Interstitial | AdType::Rewarded => (Some(json!({ "w": 320, "h": 480 })), None),
            AdType::Native => (None, Some(json!({ "ver": "1.2" }))),
        };

        BidRequest {
            imp: vec![Impression {
                id: format!("{}-1", request_id),
                tagid: placement.id.clone(),
                bidfloor: self.bid_floor,
                instl: u8::from(placement.ad_type.is_fullscreen()),
                banner,
                native,
                ext: ImpressionExt {
                    adtype: placement.ad_type,
                    placement_name: placement.name.clone(),
                },
            }],
            id: request_id,
            app: self.context.app(),
            device: self.context.device(),
            user: self.context.user(),
            regs: self.context.regs(),
            tmax: tmax.as_millis() as u64,
            ext: RequestExt {
                publisher_id: self.publisher_id.clone(),
                adapter_info,
            },
        }
    }
}
