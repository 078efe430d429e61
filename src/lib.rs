pub mod agent;
pub mod classifier;
pub mod config;
pub mod engagement;
pub mod error;
pub mod features;
pub mod input_bridge;
pub mod intercept;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod synth;
pub mod telemetry;
pub mod trainer;

pub use agent::{BehaviorIntent, DecisionAgent, Rule};
pub use engagement::{EngagementMode, EngagementScheduler, HumanInput};
pub use registry::ModelRegistry;
pub use session::{AutopilotSession, FrameOutcome};
pub use snapshot::GameStateSnapshot;
