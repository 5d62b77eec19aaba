//! Command registration, schema validation and dispatch.

use crate::codec::JsonCodec;
use crate::command::{Command, CommandAdapter, ErasedCommand};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Outcome of handling one command request.
///
/// A closed sum: every path through the dispatcher ends in exactly one of
/// these, and command bodies can only produce the last three.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandResult {
    /// The command ran to completion.
    Executed,
    /// The request arguments did not match the declared schema.
    SerializationFails { message: String },
    /// No command is registered under the requested name.
    CommandNotFound { message: String },
    /// The command body rejected the request on domain grounds.
    ExecutionFailure { message: String },
    /// The command body failed unexpectedly.
    Error { message: String },
}

/// A structured command request: name plus raw key/value arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// Execution context handed to command bodies.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    /// Who submitted the request, for audit logging.
    pub issuer: String,
}

/// Descriptions of one registered command, for help output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandHelp {
    pub name: String,
    pub short_description: String,
    pub detailed_description: String,
    pub completion_message: String,
}

/// Registration-time failures.
///
/// All of these indicate programmer mistakes in the embedding application
/// and surface before the server starts serving.
#[derive(Debug, Error)]
pub enum CommandRegistryError {
    #[error("command '{0}' is already registered")]
    DuplicateName(String),

    #[error("command '{command}': argument schema does not serialize to an object")]
    SchemaNotAnObject { command: String },

    #[error("command '{command}': failed to serialize default arguments: {source}")]
    DefaultSerialization {
        command: String,
        source: serde_json::Error,
    },

    #[error("command '{command}': field '{field}' has no argument metadata")]
    MissingMetadata { command: String, field: String },

    #[error("command '{command}': metadata refers to unknown field '{field}'")]
    UnknownField { command: String, field: String },

    #[error("command '{command}': duplicate metadata for field '{field}'")]
    DuplicateMetadata { command: String, field: String },

    #[error("command '{command}': optional field '{field}' must declare a non-null default")]
    MissingDefault { command: String, field: String },

    #[error("command '{command}': declared default {declared} for field '{field}' does not match the type's natural default {natural}")]
    DefaultMismatch {
        command: String,
        field: String,
        declared: Value,
        natural: Value,
    },

    #[error("command '{command}': field '{field}' declared as {kind:?} but defaults to {value}")]
    KindMismatch {
        command: String,
        field: String,
        kind: crate::command::ArgumentKind,
        value: Value,
    },
}

/// Routes structured command requests to registered commands.
///
/// Commands are registered once at startup; registration performs full
/// schema validation so a command that registers cleanly can never fail on
/// schema grounds other than bad request input.
pub struct CommandDispatcher {
    commands: RwLock<HashMap<String, Arc<dyn ErasedCommand>>>,
    codec: JsonCodec,
}

impl CommandDispatcher {
    /// Creates a dispatcher with the given codec configuration.
    pub fn new(codec: JsonCodec) -> Self {
        Self {
            commands: RwLock::new(HashMap::new()),
            codec,
        }
    }

    /// Registers a command, validating its argument schema.
    pub fn register<C: Command>(&self, command: C) -> Result<(), CommandRegistryError> {
        let erased: Arc<dyn ErasedCommand> = Arc::new(CommandAdapter::new(command));
        Self::validate_schema(&*erased)?;

        let name = erased.name().to_string();
        let mut commands = self.commands.write();
        if commands.contains_key(&name) {
            return Err(CommandRegistryError::DuplicateName(name));
        }
        commands.insert(name.clone(), erased);
        info!(command = %name, "registered command");
        Ok(())
    }

    /// Checks declared argument metadata against the argument struct's
    /// serialized default instance.
    fn validate_schema(command: &dyn ErasedCommand) -> Result<(), CommandRegistryError> {
        let name = command.name().to_string();
        let defaults =
            command
                .default_args()
                .map_err(|source| CommandRegistryError::DefaultSerialization {
                    command: name.clone(),
                    source,
                })?;
        let Some(natural) = defaults.as_object() else {
            return Err(CommandRegistryError::SchemaNotAnObject { command: name });
        };

        let schema = command.arguments();

        for (i, info) in schema.iter().enumerate() {
            if schema[..i].iter().any(|other| other.name == info.name) {
                return Err(CommandRegistryError::DuplicateMetadata {
                    command: name,
                    field: info.name.to_string(),
                });
            }
            if !natural.contains_key(info.name) {
                return Err(CommandRegistryError::UnknownField {
                    command: name,
                    field: info.name.to_string(),
                });
            }
        }

        for field in natural.keys() {
            if !schema.iter().any(|info| info.name == field) {
                return Err(CommandRegistryError::MissingMetadata {
                    command: name,
                    field: field.clone(),
                });
            }
        }

        for info in &schema {
            let natural_default = &natural[info.name];
            if !info.required {
                let declared = match &info.default {
                    Some(value) if !value.is_null() => value,
                    _ => {
                        return Err(CommandRegistryError::MissingDefault {
                            command: name,
                            field: info.name.to_string(),
                        })
                    }
                };
                if declared != natural_default {
                    return Err(CommandRegistryError::DefaultMismatch {
                        command: name,
                        field: info.name.to_string(),
                        declared: declared.clone(),
                        natural: natural_default.clone(),
                    });
                }
            }
            if !info.kind.matches(natural_default) {
                return Err(CommandRegistryError::KindMismatch {
                    command: name,
                    field: info.name.to_string(),
                    kind: info.kind,
                    value: natural_default.clone(),
                });
            }
        }

        Ok(())
    }

    /// Handles one request end to end.
    pub async fn handle_command(
        &self,
        ctx: &CommandContext,
        request: &CommandRequest,
    ) -> CommandResult {
        let command = self.commands.read().get(&request.name).cloned();
        let Some(command) = command else {
            return CommandResult::CommandNotFound {
                message: format!("unknown command '{}'", request.name),
            };
        };

        let normalized = match self.codec.normalize(&request.args, &command.arguments()) {
            Ok(value) => value,
            Err(message) => return CommandResult::SerializationFails { message },
        };

        command.invoke(ctx, normalized).await
    }

    /// Help entries for every registered command, sorted by name.
    pub fn help(&self) -> Vec<CommandHelp> {
        let commands = self.commands.read();
        let mut entries: Vec<_> = commands
            .values()
            .map(|command| CommandHelp {
                name: command.name().to_string(),
                short_description: command.short_description().to_string(),
                detailed_description: command.detailed_description().to_string(),
                completion_message: command.completion_message().to_string(),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Number of registered commands.
    pub fn command_count(&self) -> usize {
        self.commands.read().len()
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new(JsonCodec::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ArgumentInfo, ArgumentKind};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::json;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct ExampleArgs {
        field1: String,
        field2: i64,
        #[serde(default)]
        field3: bool,
    }

    /// Command exercising every outcome in the result sum.
    struct ExampleCommand;

    #[async_trait]
    impl Command for ExampleCommand {
        type Args = ExampleArgs;

        fn name(&self) -> &str {
            "example"
        }

        fn short_description(&self) -> &str {
            "Exercise the command pipeline"
        }

        fn detailed_description(&self) -> &str {
            "Succeeds normally; field2 = 1 blows up, field2 = 1002 is rejected"
        }

        fn completion_message(&self) -> &str {
            "example finished"
        }

        fn arguments(&self) -> Vec<ArgumentInfo> {
            vec![
                ArgumentInfo::required("field1", ArgumentKind::String, "a player id"),
                ArgumentInfo::required("field2", ArgumentKind::Integer, "a quantity"),
                ArgumentInfo::optional("field3", ArgumentKind::Boolean, json!(false), "a flag"),
            ]
        }

        async fn execute(
            &self,
            _ctx: &CommandContext,
            args: ExampleArgs,
        ) -> anyhow::Result<CommandResult> {
            match args.field2 {
                1 => Err(anyhow!("field2 = 1 is the designated crash value")),
                1002 => Ok(CommandResult::ExecutionFailure {
                    message: "quantity 1002 is not allowed".to_string(),
                }),
                _ => Ok(CommandResult::Executed),
            }
        }
    }

    fn request(name: &str, args: Value) -> CommandRequest {
        CommandRequest {
            name: name.to_string(),
            args: args.as_object().cloned().unwrap_or_default(),
        }
    }

    fn dispatcher() -> CommandDispatcher {
        let dispatcher = CommandDispatcher::default();
        dispatcher.register(ExampleCommand).unwrap();
        dispatcher
    }

    #[tokio::test]
    async fn well_formed_request_executes() {
        let result = dispatcher()
            .handle_command(
                &CommandContext::default(),
                &request("example", json!({"field1": "pid123", "field2": 12, "field3": true})),
            )
            .await;
        assert_eq!(result, CommandResult::Executed);
    }

    #[tokio::test]
    async fn execute_error_maps_to_error_result() {
        let result = dispatcher()
            .handle_command(
                &CommandContext::default(),
                &request("example", json!({"field1": "pid123", "field2": 1})),
            )
            .await;
        match result {
            CommandResult::Error { message } => assert!(message.contains("crash value")),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn domain_rejection_maps_to_execution_failure() {
        let result = dispatcher()
            .handle_command(
                &CommandContext::default(),
                &request("example", json!({"field1": "pid123", "field2": 1002})),
            )
            .await;
        match result {
            CommandResult::ExecutionFailure { message } => assert!(message.contains("1002")),
            other => panic!("expected ExecutionFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_required_field_fails_serialization() {
        let result = dispatcher()
            .handle_command(
                &CommandContext::default(),
                &request("example", json!({"field2": 12})),
            )
            .await;
        assert!(matches!(result, CommandResult::SerializationFails { .. }));
    }

    #[tokio::test]
    async fn wrong_field_type_fails_serialization() {
        let result = dispatcher()
            .handle_command(
                &CommandContext::default(),
                &request("example", json!({"field1": "pid123", "field2": {"nested": true}})),
            )
            .await;
        assert!(matches!(result, CommandResult::SerializationFails { .. }));
    }

    #[tokio::test]
    async fn unknown_command_is_reported() {
        let result = dispatcher()
            .handle_command(&CommandContext::default(), &request("nope", json!({})))
            .await;
        assert!(matches!(result, CommandResult::CommandNotFound { .. }));
    }

    #[tokio::test]
    async fn lenient_codec_round_trips_string_scalars() {
        let result = dispatcher()
            .handle_command(
                &CommandContext::default(),
                &request("example", json!({"field1": "pid123", "field2": "12", "field3": "true"})),
            )
            .await;
        assert_eq!(result, CommandResult::Executed);
    }

    #[tokio::test]
    async fn serialized_args_round_trip_to_execute() {
        // serialize a typed value, push it through the dispatcher, and have
        // the command assert it got the same value back
        #[derive(Debug)]
        struct EchoCommand {
            expected: ExampleArgs,
        }

        #[async_trait]
        impl Command for EchoCommand {
            type Args = ExampleArgs;

            fn name(&self) -> &str {
                "echo"
            }

            fn short_description(&self) -> &str {
                "Round-trip check"
            }

            fn detailed_description(&self) -> &str {
                "Asserts the deserialized argument equals the serialized one"
            }

            fn completion_message(&self) -> &str {
                "echoed"
            }

            fn arguments(&self) -> Vec<ArgumentInfo> {
                ExampleCommand.arguments()
            }

            async fn execute(
                &self,
                _ctx: &CommandContext,
                args: ExampleArgs,
            ) -> anyhow::Result<CommandResult> {
                if args == self.expected {
                    Ok(CommandResult::Executed)
                } else {
                    Ok(CommandResult::ExecutionFailure {
                        message: format!("expected {:?}, got {args:?}", self.expected),
                    })
                }
            }
        }

        let expected = ExampleArgs {
            field1: "pid9".to_string(),
            field2: -4,
            field3: true,
        };
        let serialized = serde_json::to_value(&expected).unwrap();

        let dispatcher = CommandDispatcher::default();
        dispatcher.register(EchoCommand { expected }).unwrap();

        let result = dispatcher
            .handle_command(&CommandContext::default(), &request("echo", serialized))
            .await;
        assert_eq!(result, CommandResult::Executed);
    }

    #[test]
    fn duplicate_name_fails_registration() {
        let dispatcher = dispatcher();
        let err = dispatcher.register(ExampleCommand).unwrap_err();
        assert!(matches!(err, CommandRegistryError::DuplicateName(_)));
        assert_eq!(dispatcher.command_count(), 1);
    }

    /// Command with a configurable (and mostly broken) schema, for
    /// registration validation tests.
    struct BadSchemaCommand {
        schema: Vec<ArgumentInfo>,
    }

    #[async_trait]
    impl Command for BadSchemaCommand {
        type Args = ExampleArgs;

        fn name(&self) -> &str {
            "bad"
        }

        fn short_description(&self) -> &str {
            "Never registers"
        }

        fn detailed_description(&self) -> &str {
            "Schema is intentionally wrong"
        }

        fn completion_message(&self) -> &str {
            "unreachable"
        }

        fn arguments(&self) -> Vec<ArgumentInfo> {
            self.schema.clone()
        }

        async fn execute(
            &self,
            _ctx: &CommandContext,
            _args: ExampleArgs,
        ) -> anyhow::Result<CommandResult> {
            Ok(CommandResult::Executed)
        }
    }

    fn good_schema() -> Vec<ArgumentInfo> {
        ExampleCommand.arguments()
    }

    #[test]
    fn schema_missing_metadata_is_rejected() {
        let mut schema = good_schema();
        schema.remove(2);
        let err = CommandDispatcher::default()
            .register(BadSchemaCommand { schema })
            .unwrap_err();
        assert!(matches!(err, CommandRegistryError::MissingMetadata { field, .. } if field == "field3"));
    }

    #[test]
    fn schema_unknown_field_is_rejected() {
        let mut schema = good_schema();
        schema.push(ArgumentInfo::required("ghost", ArgumentKind::String, "not real"));
        let err = CommandDispatcher::default()
            .register(BadSchemaCommand { schema })
            .unwrap_err();
        assert!(matches!(err, CommandRegistryError::UnknownField { field, .. } if field == "ghost"));
    }

    #[test]
    fn schema_optional_without_default_is_rejected() {
        let mut schema = good_schema();
        schema[2] = ArgumentInfo {
            default: None,
            ..schema[2].clone()
        };
        let err = CommandDispatcher::default()
            .register(BadSchemaCommand { schema })
            .unwrap_err();
        assert!(matches!(err, CommandRegistryError::MissingDefault { field, .. } if field == "field3"));
    }

    #[test]
    fn schema_default_mismatch_is_rejected() {
        let mut schema = good_schema();
        schema[2] = ArgumentInfo::optional("field3", ArgumentKind::Boolean, json!(true), "a flag");
        let err = CommandDispatcher::default()
            .register(BadSchemaCommand { schema })
            .unwrap_err();
        assert!(matches!(err, CommandRegistryError::DefaultMismatch { field, .. } if field == "field3"));
    }

    #[test]
    fn schema_kind_mismatch_is_rejected() {
        let mut schema = good_schema();
        schema[1] = ArgumentInfo::required("field2", ArgumentKind::String, "a quantity");
        let err = CommandDispatcher::default()
            .register(BadSchemaCommand { schema })
            .unwrap_err();
        assert!(matches!(err, CommandRegistryError::KindMismatch { field, .. } if field == "field2"));
    }

    #[test]
    fn schema_duplicate_metadata_is_rejected() {
        let mut schema = good_schema();
        schema.push(schema[0].clone());
        let err = CommandDispatcher::default()
            .register(BadSchemaCommand { schema })
            .unwrap_err();
        assert!(matches!(err, CommandRegistryError::DuplicateMetadata { field, .. } if field == "field1"));
    }

    #[test]
    fn help_lists_registered_commands() {
        let dispatcher = dispatcher();
        let help = dispatcher.help();
        assert_eq!(help.len(), 1);
        assert_eq!(help[0].name, "example");
        assert_eq!(help[0].completion_message, "example finished");
    }
}
