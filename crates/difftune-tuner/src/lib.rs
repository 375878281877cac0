//! DiffTune Gain Tuner
//!
//! Online tuning of geometric controller gains from closed-loop trajectory
//! sensitivities.
//!
//! # Architecture
//!
//! Each outer iteration simulates the full closed loop once while
//! propagating the forward sensitivity of the trajectory with respect to
//! the gains, then takes a projected gradient step on the tracking loss:
//!
//! ```text
//! for each iteration:
//!     X₀ ← rest state,  dX/dθ(0) ← 0
//!     for i in 0..N:
//!         u_i, e_i   = h(X_i, θ)
//!         dX/dθ(i+1) = (∂f/∂X + ∂f/∂u ∂h/∂X) dX/dθ(i) + ∂f/∂u ∂h/∂θ
//!         L         += ‖e_x(i)‖²,  ∇θL += 2 e_x(i)ᵀ ∂x/∂θ(i)
//!         X_{i+1}    = integrate(X_i, u_i, dt)
//!     θ ← max(θ − η ∇θL, θ_min)
//! ```
//!
//! # Components
//!
//! - [`config`]: Session configuration (JSON, validated)
//! - [`rollout`]: One closed-loop rollout with loss and gradient
//! - [`tuner`]: Outer gain adaptation loop
//! - [`report`]: Exported histories and traces

pub mod config;
pub mod rollout;
pub mod tuner;
pub mod report;

// Re-exports
pub use config::{ConfigError, IntegratorKind, TunerConfig};
pub use report::{RolloutTrace, TuningHistory};
pub use rollout::{RolloutError, RolloutResult, RolloutRunner};
pub use tuner::{GainTuner, IterationReport, Termination, TunerError, TuningOutcome};
