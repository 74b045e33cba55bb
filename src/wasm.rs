//! WebAssembly entry point: reduce a PDF held in browser memory.

use wasm_bindgen::prelude::*;

use crate::config::{ReduceConfig, TargetSize};
use crate::reducer::{reduce, Reduction};

/// Result handed back to JavaScript.
#[wasm_bindgen]
pub struct WasmReduction {
    inner: Reduction,
}

#[wasm_bindgen]
impl WasmReduction {
    #[wasm_bindgen(getter)]
    pub fn bytes(&self) -> js_sys::Uint8Array {
        js_sys::Uint8Array::from(&self.inner.bytes[..])
    }

    #[wasm_bindgen(getter)]
    pub fn size(&self) -> f64 {
        self.inner.size as f64
    }

    #[wasm_bindgen(getter, js_name = targetMet)]
    pub fn target_met(&self) -> bool {
        self.inner.target_met()
    }

    #[wasm_bindgen(getter)]
    pub fn quality(&self) -> Option<u8> {
        self.inner.final_quality()
    }
}

/// Shrink a PDF held in memory towards `target_kb` kilobytes.
#[wasm_bindgen]
pub fn reduce_pdf(input: &[u8], target_kb: u32) -> Result<WasmReduction, JsError> {
    let target = TargetSize::from_kilobytes(u64::from(target_kb))
        .map_err(|e| JsError::new(&e.to_string()))?;

    let reduction = reduce(input, target.bytes(), &ReduceConfig::default())
        .map_err(|e| JsError::new(&format!("Failed to reduce PDF: {}", e)))?;

    web_sys::console::log_1(
        &format!(
            "reduced {} -> {} bytes in {} attempts",
            input.len(),
            reduction.size,
            reduction.attempts.len()
        )
        .into(),
    );

    Ok(WasmReduction { inner: reduction })
}
