/// A tool call assembled from streamed fragments, keyed by its position in
/// the response. `arguments` is built by concatenating delta suffixes and may
/// be incomplete or invalid JSON until the message-end event arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Assembles fragmented tool-call deltas into complete call records.
///
/// One accumulator lives per request/response cycle; it is consumed at
/// message-end and a fresh one is created for the next turn.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    fragments: Vec<ToolCallFragment>,
}

impl ToolCallAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a tool-call slot at `index`, overwriting any existing fragment at
    /// that index (its insertion position is kept).
    pub fn start(&mut self, index: usize, id: String, name: String, arguments: String) {
        let fragment = ToolCallFragment {
            index,
            id,
            name,
            arguments,
        };
        match self.fragments.iter_mut().find(|f| f.index == index) {
            Some(existing) => *existing = fragment,
            None => self.fragments.push(fragment),
        }
    }

    /// Append an argument-string suffix to the fragment at `index`.
    ///
    /// A delta with no matching start is dropped; no entry is synthesized.
    pub fn append(&mut self, index: usize, delta: &str) {
        match self.fragments.iter_mut().find(|f| f.index == index) {
            Some(fragment) => fragment.arguments.push_str(delta),
            None => {
                tracing::debug!(index, "dropping tool-call delta with no matching start");
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// The complete tool-call set for this turn, in index-insertion order.
    #[must_use]
    pub fn into_calls(self) -> Vec<ToolCallFragment> {
        self.fragments
    }
}
