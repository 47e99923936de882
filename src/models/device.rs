//! Device and quantization decision table
//!
//! Both decisions are made exactly once at startup and combined into a
//! [`LoadPlan`] that the model loader consumes.

use serde::Serialize;
use std::fmt;

/// Compute device the model runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// NVIDIA GPU through the CUDA execution provider
    Cuda,
    /// Apple Silicon through the CoreML execution provider
    CoreMl,
    Cpu,
}

impl Device {
    /// Probe order. Cpu is last and always available.
    pub const PRIORITY: [Device; 3] = [Device::Cuda, Device::CoreMl, Device::Cpu];

    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cuda => "cuda",
            Device::CoreMl => "coreml",
            Device::Cpu => "cpu",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weight precision / loading strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantizationPolicy {
    /// 8-bit quantized graph, placement left to the runtime
    Int8,
    /// f32 graph loaded with reduced peak memory, then bound to the device
    FullPrecision,
}

impl fmt::Display for QuantizationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuantizationPolicy::Int8 => f.write_str("8-bit quantization"),
            QuantizationPolicy::FullPrecision => f.write_str("memory-efficient loading (float32)"),
        }
    }
}

/// The tagged configuration a loader turns into a model handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadPlan {
    pub device: Device,
    pub quantization: QuantizationPolicy,
}

impl LoadPlan {
    pub fn new(device: Device, quant_capability: bool) -> Self {
        Self {
            device,
            quantization: select_quantization(device, quant_capability),
        }
    }
}

/// Pick the first available device in [`Device::PRIORITY`] order
pub fn select_device(mut is_available: impl FnMut(Device) -> bool) -> Device {
    Device::PRIORITY
        .into_iter()
        .find(|&device| device == Device::Cpu || is_available(device))
        .unwrap_or(Device::Cpu)
}

/// 8-bit only on CUDA with the quantization capability present
pub fn select_quantization(device: Device, quant_capability: bool) -> QuantizationPolicy {
    match (device, quant_capability) {
        (Device::Cuda, true) => QuantizationPolicy::Int8,
        _ => QuantizationPolicy::FullPrecision,
    }
}
