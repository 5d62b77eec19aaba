//! The typed command trait and its argument schema metadata.

use crate::dispatcher::{CommandContext, CommandResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

/// Scalar kind of a declared argument field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgumentKind {
    String,
    Integer,
    Float,
    Boolean,
}

impl ArgumentKind {
    /// Whether a JSON value is an instance of this kind.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ArgumentKind::String => value.is_string(),
            ArgumentKind::Integer => value.is_i64() || value.is_u64(),
            ArgumentKind::Float => value.is_number(),
            ArgumentKind::Boolean => value.is_boolean(),
        }
    }
}

/// Metadata for one declared argument field.
///
/// Every field of a command's argument struct must be described by exactly
/// one `ArgumentInfo`; registration validates the set against the struct's
/// serialized `Default` value.
#[derive(Debug, Clone)]
pub struct ArgumentInfo {
    /// Serialized field name.
    pub name: &'static str,
    /// Scalar kind of the field.
    pub kind: ArgumentKind,
    /// Whether a request must supply the field.
    pub required: bool,
    /// Declared default for optional fields. Must equal the field's value in
    /// the deserialized-from-empty argument struct.
    pub default: Option<Value>,
    /// One-line description shown in command help.
    pub description: &'static str,
}

impl ArgumentInfo {
    /// A field every request must supply.
    pub fn required(name: &'static str, kind: ArgumentKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: None,
            description,
        }
    }

    /// A field with a declared default.
    pub fn optional(
        name: &'static str,
        kind: ArgumentKind,
        default: Value,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: Some(default),
            description,
        }
    }
}

/// Bound on a command's typed argument struct.
///
/// `Default` is what ties the declared schema to the type: registration
/// serializes the default instance and checks every declared field, kind and
/// default value against it.
pub trait CommandArgs:
    DeserializeOwned + Serialize + Default + Send + std::fmt::Debug + 'static
{
}

impl<T> CommandArgs for T where
    T: DeserializeOwned + Serialize + Default + Send + std::fmt::Debug + 'static
{
}

/// An internal operator action with a typed argument schema.
///
/// `execute` reports domain-level rejection by returning
/// [`CommandResult::ExecutionFailure`]; an `Err` is treated as an unexpected
/// failure and surfaces as [`CommandResult::Error`] with the cause chain
/// rendered.
#[async_trait]
pub trait Command: Send + Sync + 'static {
    /// Typed argument struct requests deserialize into.
    type Args: CommandArgs;

    /// Unique registration name.
    fn name(&self) -> &str;

    /// One-line summary for command listings.
    fn short_description(&self) -> &str;

    /// Full help text.
    fn detailed_description(&self) -> &str;

    /// Text reported to the caller on successful execution.
    fn completion_message(&self) -> &str;

    /// Declared argument schema, one entry per field of [`Args`](Command::Args).
    fn arguments(&self) -> Vec<ArgumentInfo>;

    /// Runs the command.
    async fn execute(
        &self,
        ctx: &CommandContext,
        args: Self::Args,
    ) -> anyhow::Result<CommandResult>;
}

/// Object-safe command view stored by the dispatcher.
#[async_trait]
pub(crate) trait ErasedCommand: Send + Sync {
    fn name(&self) -> &str;
    fn short_description(&self) -> &str;
    fn detailed_description(&self) -> &str;
    fn completion_message(&self) -> &str;
    fn arguments(&self) -> Vec<ArgumentInfo>;

    /// Serializes the argument struct's `Default` value, the reference point
    /// for schema validation.
    fn default_args(&self) -> Result<Value, serde_json::Error>;

    /// Deserializes normalized arguments and executes.
    async fn invoke(&self, ctx: &CommandContext, args: Value) -> CommandResult;
}

/// Bridges a typed [`Command`] into the dispatcher's table.
pub(crate) struct CommandAdapter<C: Command> {
    inner: C,
}

impl<C: Command> CommandAdapter<C> {
    pub(crate) fn new(inner: C) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<C: Command> ErasedCommand for CommandAdapter<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn short_description(&self) -> &str {
        self.inner.short_description()
    }

    fn detailed_description(&self) -> &str {
        self.inner.detailed_description()
    }

    fn completion_message(&self) -> &str {
        self.inner.completion_message()
    }

    fn arguments(&self) -> Vec<ArgumentInfo> {
        self.inner.arguments()
    }

    fn default_args(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(C::Args::default())
    }

    async fn invoke(&self, ctx: &CommandContext, args: Value) -> CommandResult {
        let typed: C::Args = match serde_json::from_value(args) {
            Ok(typed) => typed,
            Err(e) => {
                return CommandResult::SerializationFails {
                    message: format!("arguments did not match schema: {e}"),
                }
            }
        };

        info!(
            command = self.inner.name(),
            issuer = %ctx.issuer,
            args = ?typed,
            "executing command"
        );
        match self.inner.execute(ctx, typed).await {
            Ok(result) => result,
            Err(e) => {
                error!(command = self.inner.name(), "command execution failed: {e:#}");
                CommandResult::Error {
                    message: format!("{e:#}"),
                }
            }
        }
    }
}
