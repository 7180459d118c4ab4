//! Supervisory acceptor: picks at most one controllable event per tick
//!
//! [`AutomatonAcceptor`] runs a set of supervisor automata loaded from a
//! table. Guards are uncontrollable events and move every automaton that
//! has a transition for them. A controllable event is enabled when every
//! automaton whose alphabet contains it has a transition for it from its
//! current state.

use crate::error::SupervisorError;
use crate::swarm::coordinator::{Event, Guard, GuardSet};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use tracing::{debug, trace};

/// Chooses the event to execute from the guards that hold this tick
pub trait SupervisoryAcceptor: Send {
    fn choose_event(&mut self, enabled: &GuardSet) -> Option<Event>;
}

impl<F> SupervisoryAcceptor for F
where
    F: FnMut(&GuardSet) -> Option<Event> + Send,
{
    fn choose_event(&mut self, enabled: &GuardSet) -> Option<Event> {
        self(enabled)
    }
}

/// Supervisor table as written in YAML/JSON
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorTable {
    /// Order in which enabled controllable events are tried.
    /// Defaults to the built-in event order.
    #[serde(default)]
    pub priority: Vec<String>,
    pub supervisors: Vec<AutomatonSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutomatonSpec {
    pub name: String,
    pub states: Vec<String>,
    pub initial: String,
    pub transitions: Vec<TransitionSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionSpec {
    pub from: String,
    pub event: String,
    pub to: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Symbol {
    Guard(Guard),
    Event(Event),
}

impl FromStr for Symbol {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(guard) = s.parse::<Guard>() {
            return Ok(Symbol::Guard(guard));
        }
        s.parse::<Event>().map(Symbol::Event).map_err(|_| ())
    }
}

#[derive(Debug, Clone)]
struct Automaton {
    name: String,
    states: Vec<String>,
    current: usize,
    alphabet: HashSet<Symbol>,
    transitions: HashMap<(usize, Symbol), usize>,
}

impl Automaton {
    fn from_spec(spec: &AutomatonSpec) -> Result<Self, SupervisorError> {
        let index_of = |state: &str| {
            spec.states
                .iter()
                .position(|s| s == state)
                .ok_or_else(|| SupervisorError::UnknownState {
                    supervisor: spec.name.clone(),
                    state: state.to_string(),
                })
        };

        let current = index_of(&spec.initial)?;
        let mut alphabet = HashSet::new();
        let mut transitions = HashMap::new();
        for t in &spec.transitions {
            let symbol: Symbol = t.event.parse().map_err(|_| SupervisorError::UnknownEvent {
                supervisor: spec.name.clone(),
                name: t.event.clone(),
            })?;
            let from = index_of(&t.from)?;
            let to = index_of(&t.to)?;
            if transitions.insert((from, symbol), to).is_some() {
                return Err(SupervisorError::DuplicateTransition {
                    supervisor: spec.name.clone(),
                    state: t.from.clone(),
                    event: t.event.clone(),
                });
            }
            alphabet.insert(symbol);
        }

        Ok(Self {
            name: spec.name.clone(),
            states: spec.states.clone(),
            current,
            alphabet,
            transitions,
        })
    }

    /// True when the symbol is outside the alphabet or allowed from here
    fn allows(&self, symbol: Symbol) -> bool {
        !self.alphabet.contains(&symbol) || self.transitions.contains_key(&(self.current, symbol))
    }

    fn fire(&mut self, symbol: Symbol) {
        if let Some(&to) = self.transitions.get(&(self.current, symbol)) {
            trace!(
                supervisor = %self.name,
                from = %self.states[self.current],
                to = %self.states[to],
                "supervisor moved"
            );
            self.current = to;
        }
    }
}

/// Acceptor backed by a set of supervisor automata
#[derive(Debug, Clone)]
pub struct AutomatonAcceptor {
    automata: Vec<Automaton>,
    priority: Vec<Event>,
}

impl AutomatonAcceptor {
    pub fn from_table(table: &SupervisorTable) -> Result<Self, SupervisorError> {
        if table.supervisors.is_empty() {
            return Err(SupervisorError::Empty);
        }
        let automata = table
            .supervisors
            .iter()
            .map(Automaton::from_spec)
            .collect::<Result<Vec<_>, _>>()?;

        let priority = if table.priority.is_empty() {
            Event::ALL.to_vec()
        } else {
            table
                .priority
                .iter()
                .map(|name| {
                    name.parse::<Event>()
                        .map_err(|_| SupervisorError::UnknownEvent {
                            supervisor: "priority".to_string(),
                            name: name.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(Self { automata, priority })
    }

    /// Parse a YAML table (JSON is valid YAML)
    pub fn from_yaml(source: &str) -> anyhow::Result<Self> {
        let table: SupervisorTable = serde_yaml::from_str(source)?;
        Ok(Self::from_table(&table)?)
    }

    /// Current state name of each automaton
    pub fn states(&self) -> Vec<(&str, &str)> {
        self.automata
            .iter()
            .map(|a| (a.name.as_str(), a.states[a.current].as_str()))
            .collect()
    }

    fn enabled(&self, event: Event) -> bool {
        let symbol = Symbol::Event(event);
        // an event no automaton mentions is never enabled
        self.automata.iter().any(|a| a.alphabet.contains(&symbol))
            && self.automata.iter().all(|a| a.allows(symbol))
    }
}

impl SupervisoryAcceptor for AutomatonAcceptor {
    fn choose_event(&mut self, enabled: &GuardSet) -> Option<Event> {
        for guard in enabled {
            for automaton in &mut self.automata {
                automaton.fire(Symbol::Guard(*guard));
            }
        }

        let event = self.priority.iter().copied().find(|e| self.enabled(*e))?;
        for automaton in &mut self.automata {
            automaton.fire(Symbol::Event(event));
        }
        debug!(event = %event, "supervisor chose event");
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"
supervisors:
  - name: separation
    states: [far, near]
    initial: far
    transitions:
      - { from: far, event: belowSeparation, to: near }
      - { from: near, event: notBelowSeparation, to: far }
      - { from: near, event: setConnector, to: near }
  - name: role
    states: [follower, connector]
    initial: follower
    transitions:
      - { from: follower, event: setConnector, to: connector }
      - { from: connector, event: moveStop, to: connector }
  - name: motion
    states: [moving, stopped]
    initial: moving
    transitions:
      - { from: moving, event: moveStop, to: stopped }
"#;

    fn guards(list: &[Guard]) -> GuardSet {
        list.iter().copied().collect()
    }

    #[test]
    fn test_event_needs_every_automaton() {
        let mut acceptor = AutomatonAcceptor::from_yaml(TABLE).unwrap();
        // separation still "far": setConnector disabled, moveStop needs role=connector
        assert_eq!(acceptor.choose_event(&guards(&[])), None);

        assert_eq!(
            acceptor.choose_event(&guards(&[Guard::BelowSeparation])),
            Some(Event::SetConnector)
        );
        assert_eq!(
            acceptor.states(),
            vec![
                ("separation", "near"),
                ("role", "connector"),
                ("motion", "moving")
            ]
        );
        assert_eq!(acceptor.choose_event(&guards(&[])), Some(Event::MoveStop));
        assert_eq!(acceptor.choose_event(&guards(&[])), None);
    }

    #[test]
    fn test_guards_without_transition_are_ignored() {
        let mut acceptor = AutomatonAcceptor::from_yaml(TABLE).unwrap();
        // notBelowSeparation from "far" has no transition
        assert_eq!(
            acceptor.choose_event(&guards(&[Guard::NotBelowSeparation])),
            None
        );
        assert_eq!(acceptor.states()[0], ("separation", "far"));
    }

    #[test]
    fn test_priority_override() {
        let table = r#"
priority: [taskBegin, moveStop]
supervisors:
  - name: both
    states: [s]
    initial: s
    transitions:
      - { from: s, event: moveStop, to: s }
      - { from: s, event: taskBegin, to: s }
"#;
        let mut acceptor = AutomatonAcceptor::from_yaml(table).unwrap();
        assert_eq!(acceptor.choose_event(&guards(&[])), Some(Event::TaskBegin));
    }

    #[test]
    fn test_closure_acceptor() {
        let mut acceptor = |g: &GuardSet| {
            g.contains(&Guard::ConnectorCandidate)
                .then_some(Event::SetConnector)
        };
        assert_eq!(
            acceptor.choose_event(&guards(&[Guard::ConnectorCandidate])),
            Some(Event::SetConnector)
        );
        assert_eq!(acceptor.choose_event(&guards(&[])), None);
    }

    #[test]
    fn test_rejects_unknown_event() {
        let table = r#"
supervisors:
  - name: bad
    states: [a]
    initial: a
    transitions:
      - { from: a, event: jump, to: a }
"#;
        let err = AutomatonAcceptor::from_yaml(table).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SupervisorError>(),
            Some(&SupervisorError::UnknownEvent {
                supervisor: "bad".into(),
                name: "jump".into()
            })
        );
    }

    #[test]
    fn test_rejects_unknown_state() {
        let table = r#"
supervisors:
  - name: bad
    states: [a]
    initial: b
    transitions: []
"#;
        let err = AutomatonAcceptor::from_yaml(table).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SupervisorError>(),
            Some(SupervisorError::UnknownState { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_transition() {
        let table = r#"
supervisors:
  - name: bad
    states: [a, b]
    initial: a
    transitions:
      - { from: a, event: moveStop, to: a }
      - { from: a, event: moveStop, to: b }
"#;
        let err = AutomatonAcceptor::from_yaml(table).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SupervisorError>(),
            Some(SupervisorError::DuplicateTransition { .. })
        ));
    }

    #[test]
    fn test_rejects_empty_table() {
        let err = AutomatonAcceptor::from_yaml("supervisors: []").unwrap_err();
        assert_eq!(
            err.downcast_ref::<SupervisorError>(),
            Some(&SupervisorError::Empty)
        );
    }

    #[test]
    fn test_bundled_table_loads() {
        let source = include_str!("../../supervisors/connector_chain.yaml");
        AutomatonAcceptor::from_yaml(source).unwrap();
    }
}
