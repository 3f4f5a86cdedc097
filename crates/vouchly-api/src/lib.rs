// vouchly-api: Async Rust clients for the router (RouterOS REST) and the
// payment gateway (M-Pesa Daraja).

pub mod daraja;
pub mod error;
pub mod routeros;
pub mod transport;

pub use daraja::{
    DarajaClient, DarajaCredentials, DarajaEnvironment, StkCallback, StkCallbackEnvelope,
};
pub use error::Error;
pub use routeros::RouterOsClient;
pub use transport::{TlsMode, TransportConfig};
