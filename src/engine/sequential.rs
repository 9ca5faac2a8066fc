use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::{Action, ActionId, Artifact, Executor};
use crate::error::BuildError;

type Memo = HashMap<ActionId, Result<Artifact, BuildError>>;

impl Executor {
    /// Runs `root` and everything it depends on, one action at a time, in
    /// dependency order.
    ///
    /// Every action runs at most once even when reachable along several
    /// paths. The walk stops at the first failure: actions not yet started
    /// are never started.
    pub fn execute(&self, root: &Arc<Action>) -> Result<(), BuildError> {
        let mut memo = Memo::new();
        self.visit(root, &mut memo).map(|_| ())
    }

    fn visit(&self, action: &Arc<Action>, memo: &mut Memo) -> Result<Artifact, BuildError> {
        let id = ActionId::of(action);
        if let Some(result) = memo.get(&id) {
            return result.clone();
        }

        for dep in action.deps() {
            self.visit(dep, memo)?;
        }

        let result = self.run_action(action);
        memo.insert(id, result.clone());
        result
    }
}
