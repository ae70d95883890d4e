pub mod config;
pub mod driver;
pub mod input;
pub mod lifecycle;
pub mod signals;
pub use config::ExperimentConfig;
pub use driver::{DriverEffect, DriverEvent, FrameSample, TrialDriver};
pub use input::{AckGate, InputSampler};
pub use lifecycle::{Effect, LifecycleController, LifecycleEvent, CONFIRM_WINDOW};
pub use signals::{SignalCount, ToneSpec, END_TONE, START_TONE};
