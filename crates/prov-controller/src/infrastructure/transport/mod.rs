//! Transport adapters.
//!
//! - **`simulated`** – A tokio-driven stand-in for a radio link, fed from the
//!   `[[simulated_devices]]` fixture in the config file.  Used by `provctl`
//!   when no hardware backend is linked in.
//!
//! - **`mock`** – Recording doubles for tests: every scan and stop is
//!   recorded, and tests inject `on_found` / `on_not_found` by hand.
//!
//! Both implement the `prov_core` transport traits; the orchestrator never
//! knows which one it is talking to.

pub mod mock;
pub mod simulated;
