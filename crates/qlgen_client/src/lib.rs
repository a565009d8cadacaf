//! Runtime for clients generated by qlgen.
//!
//! Generated code implements [`GraphqlOperation`] for a marker struct per
//! operation and decodes responses through the helpers in [`decode`].
//! Queries and mutations run over any [`Client`]; subscriptions run over a
//! [`WebSocketClient`].
//!
//! ```ignore
//! use qlgen_client::{execute, HttpClient};
//!
//! let client = HttpClient::new("https://api.example.com/graphql")?;
//! let data = execute::<GetUser, _>(&client, GetUserVariables { id: "1".into() })
//!     .await?
//!     .into_result()?;
//! println!("{:?}", data.user);
//! ```

pub mod decode;
pub mod error;
pub mod http;
pub mod operation;
pub mod subscription;

// Generated code names serde through this crate.
pub use serde;
pub use serde_json;

pub use error::{ClientError, ErrorCode};
pub use http::{Client, ClientConfig, HttpClient};
pub use operation::{
    execute, GraphqlError, GraphqlOperation, Location, OperationKind, PathSegment, Request,
    Response,
};
pub use subscription::{Subscription, WebSocketClient};
