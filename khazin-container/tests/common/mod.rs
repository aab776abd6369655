#![allow(dead_code)]

use std::sync::Arc;

use khazin_container::prelude::*;
use parking_lot::Mutex;

pub const THREADS: usize = 8;

/// Shared event log for ordering assertions.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// A disposable service that writes to a journal when released.
pub struct Tracked {
    pub label: &'static str,
    journal: Journal,
}

impl Tracked {
    pub fn new(label: &'static str, journal: &Journal) -> Self {
        journal.record(format!("create {label}"));
        Self {
            label,
            journal: journal.clone(),
        }
    }
}

impl Disposable for Tracked {
    fn dispose(&self) {
        self.journal.record(format!("dispose {}", self.label));
    }
}

/// Registers `Tracked` under `label` with `lifetime`, resolving `needs`
/// (by name) first.
pub fn tracked(
    lifetime: Lifetime,
    label: &'static str,
    needs: &'static [&'static str],
    journal: &Journal,
) -> ServiceDescriptor {
    let journal = journal.clone();
    ServiceDescriptor::factory::<Tracked>(lifetime, move |injector| {
        for need in needs {
            injector.resolve_named::<Tracked>(need)?;
        }
        Ok(Arc::new(Tracked::new(label, &journal)))
    })
    .named(label)
    .disposable::<Tracked>()
}
