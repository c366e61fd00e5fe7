//! WebAssembly bindings for FocusGuard
//!
//! `FocusGuard` wraps the background owner for the extension's service
//! worker. Every async method returns a `Promise`. The free functions are
//! pure helpers the options page and popup can call directly.

mod host;
mod logger;

use std::rc::Rc;

use js_sys::{Array, Object, Promise, Reflect};
use log::LevelFilter;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use fg_background::Background;
use fg_core::sprint::InitOutcome;
use fg_core::{present, FocusConfig, FocusError, SprintState, StorageArea, StorageChanges};
use fg_rules::{encode_all, generate, reconcile, DnrUpdate, SyncReport};

use crate::host::{badge_details, from_js, to_js, JsClock, JsHost};

type Shared = Rc<JsHost>;
type WasmBackground = Background<Shared, Shared, Shared, Shared, Shared, JsClock>;

fn js_error(err: &FocusError) -> JsValue {
    let error = js_sys::Error::new(&err.to_string());
    let _ = Reflect::set(&error, &"code".into(), &JsValue::from_str(err.code()));
    error.into()
}

fn init_outcome(outcome: InitOutcome) -> JsValue {
    let result = Object::new();
    let (name, remaining) = match outcome {
        InitOutcome::Idle => ("idle", None),
        InitOutcome::Resumed { remaining_minutes } => ("resumed", Some(remaining_minutes)),
        InitOutcome::CompletedWhileAway => ("completedWhileAway", None),
    };
    let _ = Reflect::set(&result, &"outcome".into(), &JsValue::from_str(name));
    if let Some(minutes) = remaining {
        let _ = Reflect::set(&result, &"remainingMinutes".into(), &JsValue::from(minutes));
    }
    result.into()
}

/// `{installed, redirect, truncatedFrom?, cap?}`
fn sync_report(report: &SyncReport) -> JsValue {
    let result = Object::new();
    let _ = Reflect::set(&result, &"installed".into(), &JsValue::from(report.installed as u32));
    let _ = Reflect::set(&result, &"redirect".into(), &JsValue::from_str(report.redirect.page()));
    if let Some(exceeded) = report.truncated {
        let _ = Reflect::set(&result, &"truncatedFrom".into(), &JsValue::from(exceeded.requested as u32));
        let _ = Reflect::set(&result, &"cap".into(), &JsValue::from(exceeded.cap as u32));
    }
    result.into()
}

// =============================================================================
// Owner
// =============================================================================

#[wasm_bindgen]
pub struct FocusGuard {
    inner: Rc<WasmBackground>,
}

#[wasm_bindgen]
impl FocusGuard {
    /// `host` provides the browser APIs (see `host.rs`); `config` is an
    /// optional partial `FocusConfig` object.
    #[wasm_bindgen(constructor)]
    pub fn new(host: JsValue, config: JsValue) -> Result<FocusGuard, JsValue> {
        logger::init(LevelFilter::Info);

        let host: Object = host
            .dyn_into()
            .map_err(|_| JsValue::from_str("host must be an object"))?;

        let config = if config.is_undefined() || config.is_null() {
            FocusConfig::default()
        } else {
            let config: FocusConfig = from_js(&config).map_err(|e| JsValue::from_str(&e))?;
            config.validate().map_err(|e| js_error(&e))?;
            config
        };

        let host = Rc::new(JsHost::new(host));
        let inner = Background::new(
            host.clone(),
            host.clone(),
            host.clone(),
            host.clone(),
            host,
            JsClock,
            config,
        );
        Ok(FocusGuard {
            inner: Rc::new(inner),
        })
    }

    #[wasm_bindgen(js_name = onInstalled)]
    pub fn on_installed(&self) -> Promise {
        let inner = Rc::clone(&self.inner);
        future_to_promise(async move {
            inner
                .on_installed()
                .await
                .map(init_outcome)
                .map_err(|e| js_error(&e))
        })
    }

    #[wasm_bindgen(js_name = onStartup)]
    pub fn on_startup(&self) -> Promise {
        let inner = Rc::clone(&self.inner);
        future_to_promise(async move {
            inner
                .on_startup()
                .await
                .map(init_outcome)
                .map_err(|e| js_error(&e))
        })
    }

    /// Resolves with exactly one reply object; failures are error replies.
    #[wasm_bindgen(js_name = handleMessage)]
    pub fn handle_message(&self, message: JsValue) -> Promise {
        let inner = Rc::clone(&self.inner);
        future_to_promise(async move {
            let message = from_js(&message).map_err(|e| JsValue::from_str(&e))?;
            let reply = inner.handle_message(message).await;
            to_js(&reply).map_err(|e| JsValue::from_str(&e))
        })
    }

    /// Resolves with `true` when the alarm completed the sprint.
    #[wasm_bindgen(js_name = handleAlarm)]
    pub fn handle_alarm(&self, name: String) -> Promise {
        let inner = Rc::clone(&self.inner);
        future_to_promise(async move {
            let outcome = inner.handle_alarm(&name).await.map_err(|e| js_error(&e))?;
            Ok(JsValue::from_bool(
                outcome == fg_core::sprint::TickOutcome::Completed,
            ))
        })
    }

    /// Forward a `storage.onChanged` event. Resolves with the sync report,
    /// or `null` when no rule setting changed.
    #[wasm_bindgen(js_name = handleStorageChange)]
    pub fn handle_storage_change(&self, changes: JsValue, area_name: String) -> Promise {
        let inner = Rc::clone(&self.inner);
        future_to_promise(async move {
            let Some(area) = StorageArea::parse(&area_name) else {
                return Ok(JsValue::NULL);
            };
            let changes: StorageChanges = from_js(&changes).map_err(|e| JsValue::from_str(&e))?;
            let report = inner
                .handle_storage_change(area, &changes)
                .await
                .map_err(|e| js_error(&e))?;
            Ok(report.as_ref().map_or(JsValue::NULL, sync_report))
        })
    }

    /// Resolves with the sync report; `truncatedFrom` is set when the
    /// blocked list did not fit the rule table.
    #[wasm_bindgen(js_name = syncRules)]
    pub fn sync_rules(&self) -> Promise {
        let inner = Rc::clone(&self.inner);
        future_to_promise(async move {
            let report = inner.sync_rules().await.map_err(|e| js_error(&e))?;
            Ok(sync_report(&report))
        })
    }

    /// Current sprint view, synchronously.
    #[wasm_bindgen(js_name = getSprintState)]
    pub fn get_sprint_state(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.sprint().get_sprint_state()).map_err(|e| JsValue::from_str(&e))
    }
}

// =============================================================================
// Pure helpers
// =============================================================================

#[wasm_bindgen(js_name = setLogLevel)]
pub fn set_log_level(level: &str) -> Result<(), JsValue> {
    let level = logger::parse_level(level)
        .ok_or_else(|| JsValue::from_str(&format!("Unknown log level: {level}")))?;
    logger::init(level);
    Ok(())
}

#[wasm_bindgen(js_name = normalizePattern)]
pub fn normalize_pattern(input: &str) -> String {
    fg_core::normalize(input)
}

/// Split options-page input into trimmed, non-empty entries.
#[wasm_bindgen(js_name = splitSiteInput)]
pub fn split_site_input(text: &str) -> Array {
    fg_core::split_site_input(text)
        .into_iter()
        .map(JsValue::from_str)
        .collect()
}

/// DNR rules for `patterns`, redirecting to the regular blocked page.
#[wasm_bindgen(js_name = generateRules)]
pub fn generate_rules(patterns: JsValue, base_url: Option<String>) -> Result<JsValue, JsValue> {
    let patterns: Vec<String> = from_js(&patterns).map_err(|e| JsValue::from_str(&e))?;
    let rules = encode_all(&generate(&patterns), base_url.as_deref());
    to_js(&rules).map_err(|e| JsValue::from_str(&e))
}

/// Full `updateDynamicRules` options for the given settings.
#[wasm_bindgen(js_name = reconcileRules)]
pub fn reconcile_rules(
    patterns: JsValue,
    is_enabled: bool,
    is_sprint_active: bool,
    base_url: Option<String>,
) -> Result<JsValue, JsValue> {
    let patterns: Vec<String> = from_js(&patterns).map_err(|e| JsValue::from_str(&e))?;
    let cap = FocusConfig::default().rule_capacity;
    let reconciliation = reconcile(&patterns, is_enabled, is_sprint_active, cap);

    let result = to_js(&DnrUpdate::from_update(&reconciliation.update, base_url.as_deref()))
        .map_err(|e| JsValue::from_str(&e))?;
    if let Some(exceeded) = reconciliation.truncated {
        let _ = Reflect::set(&result, &"truncatedFrom".into(), &JsValue::from(exceeded.requested as u32));
    }
    Ok(result)
}

/// Badge for a stored sprint record (or `null`) at `now` ms.
#[wasm_bindgen(js_name = presentBadge)]
pub fn present_badge(state: JsValue, now: f64) -> Result<JsValue, JsValue> {
    let state: Option<SprintState> = from_js(&state).map_err(|e| JsValue::from_str(&e))?;
    let badge = present(state.as_ref(), now as i64);
    to_js(&badge_details(&badge)).map_err(|e| JsValue::from_str(&e))
}
