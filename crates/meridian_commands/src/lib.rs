//! # Meridian Commands
//!
//! Structured internal command dispatch. Operator tooling and trusted
//! backends submit key/value command requests; the dispatcher validates
//! each registered command's declared argument schema once at registration
//! time, then deserializes requests into the command's typed argument
//! struct and executes it.
//!
//! Outcomes form a closed sum, [`CommandResult`]: schema mismatches,
//! unknown names, domain rejections and unexpected execution errors are all
//! values, never panics or opaque errors.
//!
//! ## Example
//!
//! ```no_run
//! use meridian_commands::{
//!     ArgumentInfo, ArgumentKind, Command, CommandContext, CommandDispatcher,
//!     CommandResult,
//! };
//! use async_trait::async_trait;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct KickArgs {
//!     player: String,
//!     #[serde(default)]
//!     silent: bool,
//! }
//!
//! struct KickCommand;
//!
//! #[async_trait]
//! impl Command for KickCommand {
//!     type Args = KickArgs;
//!
//!     fn name(&self) -> &str { "kick" }
//!     fn short_description(&self) -> &str { "Disconnect a player" }
//!     fn detailed_description(&self) -> &str {
//!         "Disconnects the named player, optionally without a notice"
//!     }
//!     fn completion_message(&self) -> &str { "player kicked" }
//!
//!     fn arguments(&self) -> Vec<ArgumentInfo> {
//!         vec![
//!             ArgumentInfo::required("player", ArgumentKind::String, "player id"),
//!             ArgumentInfo::optional("silent", ArgumentKind::Boolean, false.into(), "suppress notice"),
//!         ]
//!     }
//!
//!     async fn execute(
//!         &self,
//!         _ctx: &CommandContext,
//!         args: KickArgs,
//!     ) -> anyhow::Result<CommandResult> {
//!         println!("kicking {} (silent: {})", args.player, args.silent);
//!         Ok(CommandResult::Executed)
//!     }
//! }
//! ```

pub use codec::{JsonCodec, JsonCodecOptions};
pub use command::{ArgumentInfo, ArgumentKind, Command, CommandArgs};
pub use dispatcher::{
    CommandContext, CommandDispatcher, CommandHelp, CommandRegistryError, CommandRequest,
    CommandResult,
};

mod codec;
mod command;
mod dispatcher;
