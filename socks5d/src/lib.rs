#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;
#[macro_use]
extern crate num_derive;

#[path = "common/addresses.rs"]
pub mod addresses;
#[path = "common/constants.rs"]
pub mod constants;
#[path = "common/credentials.rs"]
pub mod credentials;
#[path = "common/interface.rs"]
pub mod interface;
#[path = "common/util.rs"]
pub mod util;

pub mod config;
pub mod error;
pub mod relay;
pub mod server;
pub mod socks5;

pub use addresses::Address;
pub use config::ServerConfig;
pub use credentials::Credentials;
pub use error::SocksError;
pub use interface::SocksHandler;
pub use server::{run_server, SocksServer};
pub use socks5::{Socks5Client, Socks5Handler, Socks5Reply};
