use snafu::Snafu;

/// Failures reported by the hardware behind an [`Actuator`](crate::hardware::Actuator).
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Actuator `{name}` is not responding."))]
    Disconnected { name: &'static str },
    #[snafu(display("Actuator `{name}` reported a fault: {reason}."))]
    Fault {
        name: &'static str,
        reason: &'static str,
    },
}

pub type Result<T = (), E = Error> = core::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum SetDefaultCommandError {
    #[snafu(display("Default commands must require their subsystem."))]
    MustRequireSubsystem,
    #[snafu(display("Cannot set the default command on a subsystem that is not registered."))]
    NotRegistered,
}
