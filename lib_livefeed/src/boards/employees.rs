//! The employee roster: unfiltered, kept in roster order.

use crate::model::Employee;
use crate::reconcile::{Applied, Change, InsertPosition, LiveList};
use crate::wire::{EventEnvelope, EventType};

/// Reconciled list of employees. Deletes arrive as a bare id payload.
pub struct EmployeeRoster {
    list: LiveList<Employee>,
}

impl EmployeeRoster {
    pub fn new() -> Self {
        Self {
            list: LiveList::new(InsertPosition::Tail),
        }
    }

    pub fn seed(&mut self, employees: Vec<Employee>) {
        self.list.reset(employees);
    }

    pub fn apply(&mut self, envelope: &EventEnvelope) -> Applied {
        let change = match envelope.event_type {
            EventType::EmployeeCreated => envelope.decode::<Employee>().map(Change::Created),
            EventType::EmployeeUpdated => envelope.decode::<Employee>().map(Change::Updated),
            EventType::EmployeeDeleted => envelope.decode::<i64>().map(Change::Deleted),
            other => {
                log::debug!("ignoring {other:?} on the employee roster");
                return Applied::Ignored;
            }
        };
        match change {
            Ok(change) => self.list.apply(change),
            Err(e) => {
                log::warn!("{e}");
                Applied::Ignored
            }
        }
    }

    pub fn employees(&self) -> &[Employee] {
        self.list.items()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl Default for EmployeeRoster {
    fn default() -> Self {
        Self::new()
    }
}
