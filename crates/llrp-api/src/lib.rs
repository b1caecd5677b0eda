// llrp-api: LLRP framing, typed messages and an async session client

pub mod client;
pub mod error;
pub mod frame;
pub mod messages;
pub mod param;

pub use client::{Client, ClientState};
pub use error::Error;
pub use frame::{LlrpCodec, Message, MessageType};
pub use messages::{
    AccessSpec, AddAccessSpec, AddRoSpec, ErrorMessage, GetAccessSpecsResponse,
    GetReaderCapabilities, GetReaderConfig, GetRoSpecsResponse, ParametersResponse,
    ReaderEventNotification, Request, Response, RoAccessReport, RoSpec, RoSpecState,
    SetReaderConfig, StatusResponse,
};
pub use param::{ConnectionAttemptStatus, LlrpStatus, Parameter, StatusCode};
