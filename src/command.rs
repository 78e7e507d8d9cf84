use alloc::{boxed::Box, vec::Vec};

use crate::{Result, SubsystemRef};

/// An action the robot can perform. Runs when scheduled, until it is interrupted or it finishes.
///
/// The scheduler calls [`Command::step`] exactly once per tick and never
/// blocks; all timing inside a command is counted in ticks.
pub trait Command {
    fn get_requirements(&self) -> &[SubsystemRef];

    /// The initial subroutine of a command. Called once when the command is initially scheduled.
    fn initialize(&mut self) -> Result {
        Ok(())
    }
    fn step(&mut self) -> Result {
        Ok(())
    }
    /// Called once when the command finishes or is interrupted. Must leave
    /// every actuator the command drives at rest, and be safe to call twice.
    #[allow(unused_variables)]
    fn end(&mut self, interrupted: bool) -> Result {
        Ok(())
    }

    fn is_finished(&self) -> bool {
        false
    }

    fn runs_when_disabled(&self) -> bool {
        false
    }

    fn get_interruption_behavior(&self) -> InterruptionBehavior {
        InterruptionBehavior::default()
    }
}

/// What happens when a command is scheduled that needs a subsystem this one holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptionBehavior {
    #[default]
    CancelSelf,
    CancelIncoming,
}

pub struct FunctionalCommand {
    on_init: Box<dyn FnMut() -> Result>,
    on_step: Box<dyn FnMut() -> Result>,
    on_end: Box<dyn FnMut(bool) -> Result>,
    is_finished: Box<dyn Fn() -> bool>,
    requirements: Vec<SubsystemRef>,
}

impl FunctionalCommand {
    pub fn new(
        on_init: impl FnMut() -> Result + 'static,
        on_step: impl FnMut() -> Result + 'static,
        on_end: impl FnMut(bool) -> Result + 'static,
        is_finished: impl Fn() -> bool + 'static,
        requirements: Vec<SubsystemRef>,
    ) -> Self {
        Self {
            on_init: Box::new(on_init),
            on_step: Box::new(on_step),
            on_end: Box::new(on_end),
            is_finished: Box::new(is_finished),
            requirements,
        }
    }
}

impl Command for FunctionalCommand {
    fn get_requirements(&self) -> &[SubsystemRef] {
        &self.requirements
    }

    fn initialize(&mut self) -> Result {
        (self.on_init)()
    }

    fn step(&mut self) -> Result {
        (self.on_step)()
    }

    fn end(&mut self, interrupted: bool) -> Result {
        (self.on_end)(interrupted)
    }

    fn is_finished(&self) -> bool {
        (self.is_finished)()
    }
}

#[macro_export]
macro_rules! run_once {
    ($on_init:block) => {
        $crate::command::FunctionalCommand::new(
            move || $on_init,
            || Ok(()),
            |_| Ok(()),
            || true,
            $crate::__private::vec![],
        )
    };
    ($on_init:block, $($requirement:expr),+ $(,)?) => {
        $crate::command::FunctionalCommand::new(
            move || $on_init,
            || Ok(()),
            |_| Ok(()),
            || true,
            $crate::__private::vec![$($requirement),+],
        )
    };
}

#[macro_export]
macro_rules! run {
    ($on_step:block) => {
        $crate::command::FunctionalCommand::new(
            || Ok(()),
            move || $on_step,
            |_| Ok(()),
            || false,
            $crate::__private::vec![],
        )
    };
    ($on_step:block, $($requirement:expr),+ $(,)?) => {
        $crate::command::FunctionalCommand::new(
            || Ok(()),
            move || $on_step,
            |_| Ok(()),
            || false,
            $crate::__private::vec![$($requirement),+],
        )
    };
}

#[macro_export]
macro_rules! start_end {
    ($start:block, $end:block) => {
        $crate::command::FunctionalCommand::new(
            move || $start,
            || Ok(()),
            move |_| $end,
            || false,
            $crate::__private::vec![],
        )
    };
    ($start:block, $end:block, $($requirement:expr),+ $(,)?) => {
        $crate::command::FunctionalCommand::new(
            move || $start,
            || Ok(()),
            move |_| $end,
            || false,
            $crate::__private::vec![$($requirement),+],
        )
    };
}

#[macro_export]
macro_rules! run_end {
    ($step:block, $end:block) => {
        $crate::command::FunctionalCommand::new(
            || Ok(()),
            move || $step,
            move |_| $end,
            || false,
            $crate::__private::vec![],
        )
    };
    ($step:block, $end:block, $($requirement:expr),+ $(,)?) => {
        $crate::command::FunctionalCommand::new(
            || Ok(()),
            move || $step,
            move |_| $end,
            || false,
            $crate::__private::vec![$($requirement),+],
        )
    };
}
