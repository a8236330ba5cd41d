//! Error types for the flock simulation.
//!
//! The per-frame simulation never fails; these cover startup and
//! configuration entry points called from the page.

use std::fmt;

use wasm_bindgen::JsValue;

#[derive(Debug)]
pub enum SimError {
    /// A parameter name that `SimParams` does not know.
    UnknownParam(String),
    /// A debug overlay name that `DebugFlags` does not know.
    UnknownDebugFlag(String),
    /// A parameter snapshot that is not valid JSON for `SimParams`.
    InvalidParams(serde_json::Error),
    /// The boid sprite has not finished loading or failed to decode.
    SpriteNotLoaded { src: String },
    /// The canvas could not provide a 2D rendering context.
    MissingContext,
    /// A browser API call failed.
    Js(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::UnknownParam(name) => write!(f, "Unknown simulation parameter: {}", name),
            SimError::UnknownDebugFlag(name) => write!(f, "Unknown debug flag: {}", name),
            SimError::InvalidParams(e) => write!(f, "Invalid simulation parameters: {}", e),
            SimError::SpriteNotLoaded { src } => write!(
                f,
                "Boid sprite '{}' is not loaded; the flock cannot be drawn without it",
                src
            ),
            SimError::MissingContext => write!(f, "Canvas has no 2D rendering context"),
            SimError::Js(msg) => write!(f, "Browser call failed: {}", msg),
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimError::InvalidParams(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SimError {
    fn from(e: serde_json::Error) -> Self {
        SimError::InvalidParams(e)
    }
}

impl From<JsValue> for SimError {
    fn from(value: JsValue) -> Self {
        SimError::Js(value.as_string().unwrap_or_else(|| format!("{:?}", value)))
    }
}

impl From<SimError> for JsValue {
    fn from(e: SimError) -> Self {
        js_sys::Error::new(&e.to_string()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::SimError;

    #[test]
    fn messages_name_the_offending_input() {
        let err = SimError::UnknownParam("cohesionRaduis".to_string());
        assert_eq!(err.to_string(), "Unknown simulation parameter: cohesionRaduis");

        let err = SimError::SpriteNotLoaded {
            src: "boid.png".to_string(),
        };
        assert!(err.to_string().contains("boid.png"));
    }

    #[test]
    fn json_errors_keep_their_source() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = SimError::from(parse);
        assert!(std::error::Error::source(&err).is_some());
    }
}
