//! Session options and their validation.
//!
//! [`XBeeOptions`] is the typed form of everything needed to open a
//! session. [`validate_options`] builds one from a loosely-typed JSON
//! object (for example a configuration file) and reports problems with
//! messages naming the offending property.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;
use xbeelib_api::ApiMode;
use xbeelib_core::error::{Error, Result};
use xbeelib_transport::PortOptions;

/// Default time to wait for a correlated response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Smallest accepted response timeout.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(10);

/// Radio family of the attached module.
///
/// Determines which transmit frame is used: 802.15.4 (Series 1) modules
/// use the 64/16-bit TX requests, ZNet and ZigBee modules use the
/// transmit request frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleType {
    /// XBee Series 1 (802.15.4).
    Series1,
    /// XBee Series 2 running ZNet 2.5 firmware.
    ZNet,
    /// XBee ZigBee / ZB.
    ZigBee,
}

impl ModuleType {
    /// The canonical option value (`"802.15.4"`, `"ZNet"`, `"ZigBee"`).
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleType::Series1 => "802.15.4",
            ModuleType::ZNet => "ZNet",
            ModuleType::ZigBee => "ZigBee",
        }
    }

    /// Whether transmits go through the ZigBee transmit request (0x10).
    pub fn uses_transmit_request(self) -> bool {
        !matches!(self, ModuleType::Series1)
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "802.15.4" => Ok(ModuleType::Series1),
            "ZNet" => Ok(ModuleType::ZNet),
            "ZigBee" => Ok(ModuleType::ZigBee),
            _ => Err(Error::Validation(
                "property 'module' must be one of '802.15.4,ZNet,ZigBee'".into(),
            )),
        }
    }
}

/// Everything needed to open an XBee session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XBeeOptions {
    /// Serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub port_name: String,
    /// Serial line settings.
    pub port_options: PortOptions,
    /// Radio family.
    pub module: ModuleType,
    /// API framing mode (`AP` setting of the module).
    pub api_mode: ApiMode,
    /// Response timeout used when a command does not override it.
    pub default_timeout: Duration,
}

impl XBeeOptions {
    /// Options with default port settings, API mode 1 and a 5 s timeout.
    pub fn new(port_name: impl Into<String>, module: ModuleType) -> Self {
        XBeeOptions {
            port_name: port_name.into(),
            port_options: PortOptions::default(),
            module,
            api_mode: ApiMode::Unescaped,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Reject timeouts below [`MIN_TIMEOUT`].
pub(crate) fn check_timeout(property: &str, timeout: Duration) -> Result<()> {
    if timeout < MIN_TIMEOUT {
        return Err(Error::Validation(format!(
            "property '{}' is not greater than or equal with '{}'",
            property,
            MIN_TIMEOUT.as_millis()
        )));
    }
    Ok(())
}

/// Validate a JSON options object and convert it to [`XBeeOptions`].
///
/// Recognised properties: `portName` (string, required), `module`
/// (`"802.15.4"`, `"ZNet"` or `"ZigBee"`, required), `apiMode` (1 or 2,
/// default 1), `defaultTimeoutMs` (integer >= 10, default 5000) and
/// `portOptions` (object, see [`PortOptions`]). Other properties are
/// ignored.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use xbeelib::options::{ModuleType, validate_options};
///
/// let options = validate_options(&json!({
///     "portName": "/dev/ttyUSB0",
///     "module": "ZigBee",
///     "portOptions": { "baudRate": 115200 },
/// }))
/// .unwrap();
/// assert_eq!(options.module, ModuleType::ZigBee);
/// assert_eq!(options.port_options.baud_rate, 115_200);
///
/// let err = validate_options(&json!({ "module": "ZigBee" })).unwrap_err();
/// assert!(err.to_string().contains("property 'portName' is missing"));
/// ```
pub fn validate_options(value: &Value) -> Result<XBeeOptions> {
    let missing = |property: &str| Error::Validation(format!("property '{}' is missing", property));

    // A non-object has no properties at all, so the first required one is missing.
    let object = value.as_object().ok_or_else(|| missing("portName"))?;

    let port_name = match object.get("portName") {
        None | Some(Value::Null) => return Err(missing("portName")),
        Some(Value::String(name)) => name.clone(),
        Some(_) => {
            return Err(Error::Validation(
                "property 'portName' is not of type 'string'".into(),
            ));
        }
    };

    let module = match object.get("module") {
        None | Some(Value::Null) => return Err(missing("module")),
        Some(Value::String(name)) => name.parse::<ModuleType>()?,
        Some(_) => {
            return Err(Error::Validation(
                "property 'module' must be one of '802.15.4,ZNet,ZigBee'".into(),
            ));
        }
    };

    let api_mode = match object.get("apiMode") {
        None => ApiMode::default(),
        Some(v) => v
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .and_then(|n| ApiMode::try_from(n).ok())
            .ok_or_else(|| Error::Validation("property 'apiMode' must be one of '1,2'".into()))?,
    };

    let default_timeout = match object.get("defaultTimeoutMs") {
        None => DEFAULT_TIMEOUT,
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => {
            let ms = n.as_i64().unwrap_or(i64::MAX);
            if ms < MIN_TIMEOUT.as_millis() as i64 {
                return Err(Error::Validation(format!(
                    "property 'defaultTimeoutMs' is not greater than or equal with '{}'",
                    MIN_TIMEOUT.as_millis()
                )));
            }
            Duration::from_millis(ms as u64)
        }
        Some(_) => {
            return Err(Error::Validation(
                "property 'defaultTimeoutMs' is not of type 'integer'".into(),
            ));
        }
    };

    let port_options = match object.get("portOptions") {
        None => PortOptions::default(),
        Some(v @ Value::Object(_)) => serde_json::from_value(v.clone()).map_err(|e| {
            Error::Validation(format!("property 'portOptions' is invalid: {}", e))
        })?,
        Some(_) => {
            return Err(Error::Validation(
                "property 'portOptions' is not of type 'object', must be an object".into(),
            ));
        }
    };

    Ok(XBeeOptions {
        port_name,
        port_options,
        module,
        api_mode,
        default_timeout,
    })
}
