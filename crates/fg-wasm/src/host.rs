//! Collaborators backed by a JS host object
//!
//! The extension's background script passes an object exposing thin async
//! wrappers over the `chrome.*` APIs:
//!
//! ```text
//! storageGet(area, keys)      -> Promise<object>
//! storageSet(area, items)     -> Promise<void>
//! storageRemove(area, keys)   -> Promise<void>
//! alarmCreate(name, info)     -> Promise<void>
//! alarmClear(name)            -> Promise<boolean>
//! updateRules(options)        -> Promise<void>
//! setBadge({ path, text, color }) -> Promise<void>
//! notify(message)             -> Promise<void>
//! ```
//!
//! Values cross the boundary as JSON.

use js_sys::{Array, Function, Object, Promise, Reflect, JSON};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

use fg_core::notify::SurfaceError;
use fg_core::rule_table::RuleTableError;
use fg_core::storage::{StorageError, StorageMap};
use fg_core::timer::TimerError;
use fg_core::{
    Badge, BadgeSink, Clock, Event, Notifier, RuleTable, RuleUpdate, Schedule, Scheduler, Storage,
    StorageArea, Timestamp,
};
use fg_rules::DnrUpdate;

pub struct JsHost {
    host: Object,
}

impl JsHost {
    pub fn new(host: Object) -> Self {
        Self { host }
    }

    async fn call(&self, method: &str, args: &[JsValue]) -> Result<JsValue, String> {
        let func: Function = Reflect::get(&self.host, &JsValue::from_str(method))
            .map_err(|e| describe(&e))?
            .dyn_into()
            .map_err(|_| format!("host.{method} is not a function"))?;

        let argv: Array = args.iter().collect();
        let result = func.apply(&self.host, &argv).map_err(|e| describe(&e))?;
        JsFuture::from(Promise::resolve(&result))
            .await
            .map_err(|e| describe(&e))
    }
}

// =============================================================================
// JSON Bridging
// =============================================================================

/// Best-effort message for a thrown JS value.
pub fn describe(value: &JsValue) -> String {
    if let Some(text) = value.as_string() {
        return text;
    }
    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    format!("{value:?}")
}

pub fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, String> {
    let text = serde_json::to_string(value).map_err(|e| e.to_string())?;
    JSON::parse(&text).map_err(|e| describe(&e))
}

/// Decode a JS value; `undefined` and `null` decode as JSON `null`.
pub fn from_js<T: DeserializeOwned>(value: &JsValue) -> Result<T, String> {
    let text = if value.is_undefined() || value.is_null() {
        "null".to_string()
    } else {
        JSON::stringify(value)
            .map(String::from)
            .map_err(|e| describe(&e))?
    };
    serde_json::from_str(&text).map_err(|e| e.to_string())
}

fn keys_array(keys: &[&str]) -> JsValue {
    keys.iter().map(|key| JsValue::from_str(key)).collect::<Array>().into()
}

// =============================================================================
// Collaborators
// =============================================================================

impl Storage for JsHost {
    async fn get(&self, area: StorageArea, keys: &[&str]) -> Result<StorageMap, StorageError> {
        let result = self
            .call("storageGet", &[JsValue::from_str(area.as_str()), keys_array(keys)])
            .await
            .map_err(StorageError::new)?;
        let items: Option<StorageMap> = from_js(&result).map_err(StorageError::new)?;
        Ok(items.unwrap_or_default())
    }

    async fn set(&self, area: StorageArea, items: StorageMap) -> Result<(), StorageError> {
        let items = to_js(&items).map_err(StorageError::new)?;
        self.call("storageSet", &[JsValue::from_str(area.as_str()), items])
            .await
            .map_err(StorageError::new)?;
        Ok(())
    }

    async fn remove(&self, area: StorageArea, keys: &[&str]) -> Result<(), StorageError> {
        self.call("storageRemove", &[JsValue::from_str(area.as_str()), keys_array(keys)])
            .await
            .map_err(StorageError::new)?;
        Ok(())
    }
}

impl Scheduler for JsHost {
    async fn schedule(&self, name: &str, schedule: Schedule) -> Result<(), TimerError> {
        let info = to_js(&schedule).map_err(TimerError::new)?;
        self.call("alarmCreate", &[JsValue::from_str(name), info])
            .await
            .map_err(TimerError::new)?;
        Ok(())
    }

    async fn cancel(&self, name: &str) -> Result<bool, TimerError> {
        let cleared = self
            .call("alarmClear", &[JsValue::from_str(name)])
            .await
            .map_err(TimerError::new)?;
        Ok(cleared.as_bool().unwrap_or(false))
    }
}

impl RuleTable for JsHost {
    async fn replace(&self, update: &RuleUpdate) -> Result<(), RuleTableError> {
        let options = to_js(&DnrUpdate::from_update(update, None)).map_err(RuleTableError::new)?;
        self.call("updateRules", &[options])
            .await
            .map_err(RuleTableError::new)?;
        Ok(())
    }
}

impl BadgeSink for JsHost {
    async fn show(&self, badge: &Badge) -> Result<(), SurfaceError> {
        let details = to_js(&badge_details(badge)).map_err(SurfaceError::new)?;
        self.call("setBadge", &[details])
            .await
            .map_err(SurfaceError::new)?;
        Ok(())
    }
}

impl Notifier for JsHost {
    async fn notify(&self, event: &Event) -> Result<(), SurfaceError> {
        let message = to_js(event).map_err(SurfaceError::new)?;
        self.call("notify", &[message])
            .await
            .map_err(SurfaceError::new)?;
        Ok(())
    }
}

/// `action.setIcon` path map plus badge text and color.
pub fn badge_details(badge: &Badge) -> Value {
    let path: Map<String, Value> = badge
        .icon
        .paths()
        .iter()
        .map(|(size, path)| (size.to_string(), Value::from(*path)))
        .collect();
    json!({
        "path": path,
        "text": badge.text,
        "color": badge.color,
    })
}

/// `Date.now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsClock;

impl Clock for JsClock {
    fn now_ms(&self) -> Timestamp {
        js_sys::Date::now() as Timestamp
    }
}
