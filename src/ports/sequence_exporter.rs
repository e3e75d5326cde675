//! PlantUML Sequence Exporter
//!
//! Walks the call graph depth-first from the session root and emits one call line per
//! included callee, bracketed by activate/deactivate of the callee's participant.

use indexmap::IndexSet;

use crate::domain::callable::{Callable, CallableId};
use crate::domain::callgraph::CallGraphIndex;

const HEADER: &str = "@startuml\n\n";
const FOOTER: &str = "\n@enduml";

pub struct SequenceExporter;

impl SequenceExporter {
    /// Convert the included part of the tree below `root` to diagram text.
    pub fn export(index: &CallGraphIndex, root: &CallableId, included: &IndexSet<CallableId>) -> String {
        let mut body = String::new();

        if let Ok(callable) = index.lookup(root) {
            let mut path = vec![root.clone()];
            if included.contains(root) {
                Self::emit_call(&mut body, "", callable);
                Self::expand_node(index, root, &callable.participant, included, &mut path, &mut body);
                Self::push_line(&mut body, format!("deactivate \"{}\"", callable.participant));
            } else {
                Self::expand_node(index, root, "", included, &mut path, &mut body);
            }
        }

        format!("{}{}{}", HEADER, body, FOOTER)
    }

    /// `sender` is the participant of the nearest included ancestor, or empty.
    fn expand_node(
        index: &CallGraphIndex,
        node_id: &CallableId,
        sender: &str,
        included: &IndexSet<CallableId>,
        path: &mut Vec<CallableId>,
        body: &mut String,
    ) {
        for callee in index.callees_of(node_id) {
            // Cycles are cut at the back edge; the call itself is still drawn.
            let descend = !path.contains(&callee.id);

            if included.contains(&callee.id) {
                Self::emit_call(body, sender, callee);
                if descend {
                    path.push(callee.id.clone());
                    Self::expand_node(index, &callee.id, &callee.participant, included, path, body);
                    path.pop();
                }
                Self::push_line(body, format!("deactivate \"{}\"", callee.participant));
            } else if descend {
                path.push(callee.id.clone());
                Self::expand_node(index, &callee.id, sender, included, path, body);
                path.pop();
            }
        }
    }

    fn emit_call(body: &mut String, sender: &str, callee: &Callable) {
        let from = if sender.is_empty() {
            String::new()
        } else {
            format!("\"{}\"", sender)
        };
        Self::push_line(
            body,
            format!("{} -> \"{}\": {}", from, callee.participant, callee.qualified_name),
        );
        Self::push_line(body, format!("activate \"{}\"", callee.participant));
    }

    fn push_line(body: &mut String, line: String) {
        body.push_str(&line);
        body.push('\n');
    }
}
