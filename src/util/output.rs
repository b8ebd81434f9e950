#![allow(clippy::print_stdout)]

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use std::sync::Mutex;

/// Key/value pairs collected by the actions for `--json`, in insertion order.
static JSON_OUTPUT: Mutex<Vec<(String, Value)>> = Mutex::new(Vec::new());
static SHOULD_PRINT_OUTPUT: Mutex<bool> = Mutex::new(true);

pub fn set_should_print_output(should_print: bool) {
    if let Ok(mut flag) = SHOULD_PRINT_OUTPUT.lock() {
        *flag = should_print;
    }
}

pub fn print_output(printed_output: &str) {
    if SHOULD_PRINT_OUTPUT.lock().map(|flag| *flag).unwrap_or(true) {
        println!("{}", printed_output);
    }
}

pub fn set_json_output(key: &str, value: Value) {
    if let Ok(mut output) = JSON_OUTPUT.lock() {
        output.retain(|(k, _)| k != key);
        output.push((key.to_string(), value));
    }
}

#[macro_export]
macro_rules! outln {
    ( $fmt:expr $(, $args:expr)*) => {
        $crate::util::print_output(&format!($fmt $(, $args)*))
    };
}

pub fn json_output() -> Result<Value> {
    let output = JSON_OUTPUT
        .lock()
        .map_err(|_| anyhow!("JSON output is poisoned"))?;
    let map: serde_json::Map<String, Value> = output.iter().cloned().collect();
    Ok(Value::Object(map))
}

pub fn print_json_output() -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(&json_output()?).context("Error serializing JSON")?
    );
    Ok(())
}
