//! `sprout set`: drive an actuator and report how the command resolved.

use sprout_core::{
    ChannelValue, CommandStatus, Controller, CoreError, ParseError, PendingCommand, SyncConfig,
};

use crate::cli::{GlobalOpts, SetArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(config: SyncConfig, args: SetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let catalog = config.channels.clone();
    let ack_secs = config.ack_timeout.as_secs();

    // Reject bad arguments before opening a connection.
    let id = catalog.resolve(&args.channel).map_err(|e| {
        let err = match e {
            ParseError::UnknownChannel(name) => CoreError::UnknownChannel { name },
            other => CoreError::Parse(other),
        };
        util::core_error(err, &catalog)
    })?;
    if !id.is_actuator() {
        return Err(CliError::NotAnActuator {
            channel: args.channel,
        });
    }
    ChannelValue::parse(&id, &args.value).map_err(|e| CliError::from(CoreError::Parse(e)))?;

    // The acknowledgment arrives on the push stream (or a fallback poll),
    // so this command runs a full connection rather than a one-shot.
    let controller = Controller::new(config)?;
    controller
        .connect()
        .await
        .map_err(|e| util::core_error(e, &catalog))?;
    let result = controller.set_actuator(&args.channel, &args.value).await;
    controller.disconnect().await;

    let command: PendingCommand = result.map_err(|e| util::core_error(e, &catalog))?;
    match command.status {
        CommandStatus::Acknowledged => {
            let out = output::render_single(
                &global.output,
                &command,
                |c| format!("{} set to {} (acknowledged)", c.channel, c.value),
                |c| c.status.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
        CommandStatus::TimedOut => Err(CliError::Unconfirmed {
            channel: command.channel.name().to_owned(),
            seconds: ack_secs,
        }),
        other => Err(CliError::Internal(format!(
            "command for {} ended as {other}",
            command.channel
        ))),
    }
}
