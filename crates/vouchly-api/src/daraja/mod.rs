// Safaricom M-Pesa Daraja API
//
// OAuth client-credential tokens, Lipa Na M-Pesa Online (STK push) and
// the asynchronous STK callback payload.

pub mod client;
pub mod models;

pub use client::{DarajaClient, DarajaCredentials, DarajaEnvironment, stk_password};
pub use models::{CallbackItem, StkCallback, StkCallbackEnvelope, StkPushRequest, StkPushResponse};
