use crate::auction::Bid;
use crate::types::LossReason;
use crate::utils::{expand_macros, now_millis};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Inputs available to payload templates for one notification
#[derive(Debug, Clone)]
pub struct PayloadContext<'a> {
    pub auction_id: &'a str,
    pub bid: Option<&'a Bid>,
    pub is_win: bool,
    pub loss_reason: Option<LossReason>,
    /// Price of the auction's winning bid, 0.0 without a winner
    pub loaded_bid_price: f64,
}

impl PayloadContext<'_> {
    fn macros(&self) -> Vec<(&'static str, String)> {
        let price = if self.loaded_bid_price > 0.0 {
            self.loaded_bid_price
        } else {
            self.bid.map(|b| b.price).unwrap_or_default()
        };
        let mut macros = vec![
            ("AUCTION_PRICE", price.to_string()),
            ("AUCTION_ID", self.auction_id.to_string()),
        ];
        if let Some(bid) = self.bid {
            macros.push(("AUCTION_BID_ID", bid.id.clone()));
            macros.push(("AUCTION_IMP_ID", bid.imp_id.clone()));
        }
        if let Some(reason) = self.loss_reason {
            macros.push(("AUCTION_LOSS", reason.code().to_string()));
        }
        macros
    }
}

/// Builds win/loss payloads from the server-supplied key -> template map.
///
/// Templates:
/// - `auction.id`
/// - `bid.id`, `bid.impid`, `bid.price`, `bid.adid`, `bid.adapter`,
///   `bid.seat`, `bid.dealid`, `bid.rank`, `bid.nurl`, `bid.lurl`, `bid.burl`
/// - `sdk.win`, `sdk.notificationType`, `sdk.lossReason`,
///   `sdk.loadedBidPrice`, `sdk.timestamp`
/// - `sdk.[<win template>|<loss template>]` picks a branch by outcome
///
/// Anything else is a literal. String results get `${AUCTION_PRICE}`,
/// `${AUCTION_LOSS}`, `${AUCTION_ID}` and `${AUCTION_BID_ID}` expanded.
#[derive(Debug, Clone, Default)]
pub struct FieldResolver {
    mapping: HashMap<String, String>,
}

impl FieldResolver {
    pub fn new(mapping: HashMap<String, String>) -> Self {
        Self { mapping }
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Payload object for a notification, `None` without a mapping
    pub fn build_payload(&self, ctx: &PayloadContext<'_>) -> Option<Map<String, Value>> {
        if self.mapping.is_empty() {
            return None;
        }
        let macros = ctx.macros();
        Some(
            self.mapping
                .iter()
                .map(|(key, template)| (key.clone(), resolve(template, ctx, &macros)))
                .collect(),
        )
    }
}

fn resolve(template: &str, ctx: &PayloadContext<'_>, macros: &[(&str, String)]) -> Value {
    let template = template.trim();

    if let Some(branches) = template
        .strip_prefix("sdk.[")
        .and_then(|rest| rest.strip_suffix(']'))
    {
        let (win, loss) = branches.split_once('|').unwrap_or((branches, ""));
        let chosen = if ctx.is_win { win } else { loss };
        return resolve(chosen, ctx, macros);
    }

    match template {
        "auction.id" => Value::from(ctx.auction_id),
        "sdk.win" => Value::Bool(ctx.is_win),
        "sdk.notificationType" => Value::from(if ctx.is_win { "win" } else { "loss" }),
        "sdk.lossReason" => ctx
            .loss_reason
            .filter(|_| !ctx.is_win)
            .map(|r| Value::from(r.code()))
            .unwrap_or(Value::Null),
        "sdk.loadedBidPrice" => Value::from(ctx.loaded_bid_price),
        "sdk.timestamp" => Value::from(now_millis()),
        field if field.starts_with("bid.") => match ctx.bid {
            Some(bid) => bid_field(bid, &field[4..], macros),
            None => Value::Null,
        },
        literal => Value::from(expand_macros(literal, macros)),
    }
}

fn bid_field(bid: &Bid, field: &str, macros: &[(&str, String)]) -> Value {
    let text = |value: &Option<String>| match value {
        Some(v) => Value::from(expand_macros(v, macros)),
        None => Value::Null,
    };
    match field {
        "id" => Value::from(bid.id.as_str()),
        "impid" => Value::from(bid.imp_id.as_str()),
        "price" => Value::from(bid.price),
        "adid" => text(&bid.ad_id),
        "adapter" => Value::from(bid.adapter_code.as_str()),
        "seat" => text(&bid.seat),
        "dealid" => text(&bid.deal_id),
        "rank" => bid.rank.map(Value::from).unwrap_or(Value::Null),
        "nurl" => text(&bid.nurl),
        "lurl" => text(&bid.lurl),
        "burl" => text(&bid.burl),
        _ => Value::Null,
    }
}

