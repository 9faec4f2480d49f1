pub mod ledger;
pub mod registry;
pub mod otp;
pub mod orchestrator;
pub mod memory;

pub use ledger::SeatLedger;
pub use registry::RequestRegistry;
pub use otp::{OtpCodes, OtpGate, OtpPolicy};
pub use orchestrator::{DropOutcome, RespondOutcome, RetryPolicy, RideOrchestrator};
pub use memory::MemoryRideStore;
