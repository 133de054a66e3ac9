// Test modules for gatewayctl
// Each module covers the corresponding source file; `sim` is the shared
// in-memory gateway.

mod config_tests;
mod types_tests;
mod upnp_tests;
