#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::{rc::Rc, vec::Vec};
use core::{cell::RefCell, hash::Hash, ops::Deref};

use command::{Command, InterruptionBehavior};
use hashbrown::{HashMap, HashSet};
use log::{debug, info};
use subsystem::Subsystem;

pub mod command;
pub mod commands;
pub mod config;
pub mod control;
pub mod drive;
pub mod error;
pub mod hardware;
pub mod robot;
pub mod roller;
pub mod sequence;
pub mod sim;
pub mod subsystem;
pub mod tunable;

pub use error::{Error, Result, SetDefaultCommandError};

#[doc(hidden)]
pub mod __private {
    pub use alloc::vec;
}

#[derive(Clone)]
pub struct SubsystemRef(pub Rc<RefCell<dyn Subsystem>>);

impl PartialEq for SubsystemRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for SubsystemRef {}

impl Hash for SubsystemRef {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).cast::<()>().hash(state);
    }
}

impl From<Rc<RefCell<dyn Subsystem>>> for SubsystemRef {
    fn from(subsystem: Rc<RefCell<dyn Subsystem>>) -> Self {
        Self(subsystem)
    }
}

impl<T: Subsystem + 'static> From<T> for SubsystemRef {
    fn from(subsystem: T) -> Self {
        Self(Rc::new(RefCell::new(subsystem)))
    }
}

impl Deref for SubsystemRef {
    type Target = Rc<RefCell<dyn Subsystem>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Clone)]
pub struct CommandRef(pub Rc<RefCell<dyn Command>>);

impl PartialEq for CommandRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for CommandRef {}

impl Hash for CommandRef {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).cast::<()>().hash(state);
    }
}

impl From<Rc<RefCell<dyn Command>>> for CommandRef {
    fn from(command: Rc<RefCell<dyn Command>>) -> Self {
        Self(command)
    }
}

impl<T: Command + 'static> From<T> for CommandRef {
    fn from(command: T) -> Self {
        Self(Rc::new(RefCell::new(command)))
    }
}

impl Deref for CommandRef {
    type Target = Rc<RefCell<dyn Command>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Drives commands once per tick and keeps every subsystem owned by at most
/// one command.
///
/// The scheduler is a plain value owned by the robot; nothing in the crate
/// calls it on its own.
#[derive(Default)]
pub struct CommandScheduler {
    subsystems: HashMap<SubsystemRef, Option<CommandRef>>,
    /// In the order they were scheduled.
    scheduled_commands: Vec<CommandRef>,
    requirements: HashMap<SubsystemRef, CommandRef>,
    disabled: bool,
}

impl CommandScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subsystem with the scheduler.
    pub fn register<S: Subsystem + 'static>(&mut self, subsystem: S) -> Rc<RefCell<S>> {
        let subsystem = Rc::new(RefCell::new(subsystem));
        self.subsystems
            .insert(SubsystemRef(subsystem.clone()), None);
        subsystem
    }

    /// Schedule a command to run.
    ///
    /// Commands holding any of its requirements are interrupted first, unless
    /// one of them is [`InterruptionBehavior::CancelIncoming`], in which case
    /// the new command is dropped.
    pub fn schedule(&mut self, command: impl Into<CommandRef>) -> Result {
        let command = command.into();
        if self.is_scheduled(&command) {
            return Ok(());
        }
        if self.disabled && !command.borrow().runs_when_disabled() {
            debug!("Not scheduling a command while disabled");
            return Ok(());
        }

        let requirements = Self::requirements_of(&*command.borrow());
        let requiring_commands = requirements
            .iter()
            .filter_map(|r| self.requirements.get(r).cloned())
            .collect::<Vec<_>>();

        for requiring in &requiring_commands {
            if requiring.borrow().get_interruption_behavior()
                == InterruptionBehavior::CancelIncoming
            {
                return Ok(());
            }
        }

        for requiring in &requiring_commands {
            self.cancel(requiring)?;
        }

        self.init_command(command, requirements)
    }

    fn init_command(&mut self, command: CommandRef, requirements: HashSet<SubsystemRef>) -> Result {
        self.requirements
            .extend(requirements.into_iter().map(|r| (r, command.clone())));
        self.scheduled_commands.push(command.clone());
        let result = command.borrow_mut().initialize();
        result
    }

    /// Interrupts a scheduled command. Does nothing if it is not scheduled.
    pub fn cancel(&mut self, command: &CommandRef) -> Result {
        if !self.is_scheduled(command) {
            return Ok(());
        }

        self.release(command);
        let result = command.borrow_mut().end(true);
        result
    }

    fn release(&mut self, command: &CommandRef) {
        self.scheduled_commands.retain(|c| c != command);
        self.requirements.retain(|_, owner| owner != command);
    }

    pub fn is_scheduled(&self, command: &CommandRef) -> bool {
        self.scheduled_commands.contains(command)
    }

    /// The command currently holding `subsystem`, if any.
    pub fn requiring<S: Subsystem + 'static>(&self, subsystem: &Rc<RefCell<S>>) -> Option<CommandRef> {
        self.requirements
            .get(&SubsystemRef(subsystem.clone()))
            .cloned()
    }

    pub fn set_default_command<S>(
        &mut self,
        subsystem: &Rc<RefCell<S>>,
        command: impl Command + 'static,
    ) -> Result<(), SetDefaultCommandError>
    where
        S: Subsystem + 'static,
    {
        let subsystem = SubsystemRef(subsystem.clone());
        let requirements = Self::requirements_of(&command);
        if !requirements.contains(&subsystem) {
            return Err(SetDefaultCommandError::MustRequireSubsystem);
        }

        let default = self
            .subsystems
            .get_mut(&subsystem)
            .ok_or(SetDefaultCommandError::NotRegistered)?;
        default.replace(CommandRef::from(command));

        Ok(())
    }

    pub fn remove_default_command<S>(&mut self, subsystem: &Rc<RefCell<S>>) -> Option<CommandRef>
    where
        S: Subsystem + 'static,
    {
        self.subsystems
            .get_mut(&SubsystemRef(subsystem.clone()))?
            .take()
    }

    /// Runs one tick: subsystem `periodic` hooks, then one `step` of every
    /// scheduled command, then default commands for idle subsystems.
    ///
    /// Commands whose `step` fails stay scheduled; the error is returned after
    /// the remaining commands have run.
    pub fn run(&mut self) -> Result {
        for subsystem in self.subsystems.keys() {
            subsystem.borrow_mut().periodic();
        }

        let mut first_error = Ok(());
        let scheduled_commands = self.scheduled_commands.clone();
        for command in scheduled_commands {
            // An earlier command's end may have interrupted this one.
            if !self.is_scheduled(&command) {
                continue;
            }

            let result = command.borrow_mut().step();
            if result.is_err() {
                first_error = first_error.and(result);
                continue;
            }

            let finished = command.borrow().is_finished();
            if finished {
                self.release(&command);
                let result = command.borrow_mut().end(false);
                first_error = first_error.and(result);
            }
        }

        if !self.disabled {
            let idle_defaults = self
                .subsystems
                .iter()
                .filter(|(subsystem, _)| !self.requirements.contains_key(*subsystem))
                .filter_map(|(_, default)| default.clone())
                .collect::<Vec<_>>();
            for default_command in idle_defaults {
                let result = self.schedule(default_command);
                first_error = first_error.and(result);
            }
        }

        first_error
    }

    fn requirements_of(command: &dyn Command) -> HashSet<SubsystemRef> {
        command.get_requirements().iter().cloned().collect()
    }

    /// Interrupts every scheduled command, ending each even if an earlier one
    /// fails to stop. Returns the first failure.
    pub fn cancel_all(&mut self) -> Result {
        let mut first_error = Ok(());
        for command in self.scheduled_commands.clone() {
            let result = self.cancel(&command);
            first_error = first_error.and(result);
        }
        first_error
    }

    /// While disabled only commands that run when disabled are kept.
    pub fn set_disabled(&mut self, disabled: bool) -> Result {
        if self.disabled == disabled {
            return Ok(());
        }
        self.disabled = disabled;
        info!("Scheduler {}", if disabled { "disabled" } else { "enabled" });
        if !disabled {
            return Ok(());
        }

        let mut first_error = Ok(());
        for command in self.scheduled_commands.clone() {
            if !command.borrow().runs_when_disabled() {
                let result = self.cancel(&command);
                first_error = first_error.and(result);
            }
        }
        first_error
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled_commands.len()
    }
}
