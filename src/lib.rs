pub mod builder;
pub mod config;
pub mod context;
pub mod dockerfile;
pub mod engine;
pub mod error;
pub mod exporter;
pub mod graph;
pub mod ignore;
pub mod notifier;
pub mod progress;
pub mod registry;
pub mod scheduler;
pub mod script;

// Re-exports for easy access
pub use builder::{Builder, CancelFlag};
pub use config::{BuildOverrides, Config, ImageSpec};
pub use engine::{BuildMessage, BuildOptions, DockerEngine, Engine};
pub use error::LayercakeError;
pub use notifier::Notifier;
pub use registry::{ExportRecord, ExportRegistry};
pub use script::{BuildScript, ScriptValue};
