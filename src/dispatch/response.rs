use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::executor::DispatchOutcome;

/// Wire envelope for every API response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    /// `data` is always present on success, null when the handler had nothing to say
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            errors: None,
            data: Some(data),
        }
    }

    pub fn failure(errors: Value) -> Self {
        Self {
            ok: false,
            errors: Some(errors),
            data: None,
        }
    }
}

/// A terminal response: status plus envelope
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub envelope: Envelope,
}

impl Reply {
    pub fn new(status: StatusCode, envelope: Envelope) -> Self {
        Self { status, envelope }
    }

    pub fn ok(data: Value) -> Self {
        Self::new(StatusCode::OK, Envelope::success(data))
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}

/// Turns dispatch outcomes into wire replies
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseDispatcher;

impl ResponseDispatcher {
    pub fn reply(&self, outcome: DispatchOutcome) -> Reply {
        match outcome {
            DispatchOutcome::Success(data) => Reply::ok(data),
            DispatchOutcome::BusinessError(errors) => {
                Reply::new(StatusCode::BAD_REQUEST, Envelope::failure(errors))
            }
            DispatchOutcome::Fault(message) => Reply::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                Envelope::failure(Value::String(message)),
            ),
            DispatchOutcome::Halted(reply) => reply,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_envelope_keeps_null_data() {
        let reply = ResponseDispatcher.reply(DispatchOutcome::Success(Value::Null));
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(serde_json::to_value(&reply.envelope).unwrap(), json!({"ok": true, "data": null}));
    }

    #[test]
    fn outcomes_map_to_status_classes() {
        let business = ResponseDispatcher.reply(DispatchOutcome::BusinessError(json!("x")));
        assert_eq!(business.status, StatusCode::BAD_REQUEST);
        assert_eq!(serde_json::to_value(&business.envelope).unwrap(), json!({"ok": false, "errors": "x"}));

        let fault = ResponseDispatcher.reply(DispatchOutcome::Fault("boom".into()));
        assert_eq!(fault.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fault.envelope.errors, Some(json!("boom")));

        let halted = Reply::new(StatusCode::FORBIDDEN, Envelope::failure(json!("no")));
        assert_eq!(ResponseDispatcher.reply(DispatchOutcome::Halted(halted.clone())), halted);
    }
}
