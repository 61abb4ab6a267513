use std::collections::HashSet;

/// SSA name allocation for a single function body.
///
/// Anonymous values are numbered `%0`, `%1`, ... and named values use a hint
/// (`%cst`, `%padded`). A hint that is already taken gets a `_N` suffix drawn
/// from one counter shared by all hints, as the MLIR printer does.
#[derive(Debug, Default)]
pub struct Scope {
    next_anonymous: usize,
    next_conflict: usize,
    used: HashSet<String>,
    regions: Vec<Vec<String>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the function argument at `index`.
    pub fn argument(&mut self, index: usize) -> String {
        self.claim(format!("arg{index}"))
    }

    /// Next anonymous value name.
    pub fn anonymous(&mut self) -> String {
        let name = format!("%{}", self.next_anonymous);
        self.next_anonymous += 1;
        name
    }

    /// A value name derived from `hint`, made unique within the visible scope.
    pub fn named(&mut self, hint: &str) -> String {
        if !self.used.contains(hint) {
            return self.claim(hint.to_string());
        }

        loop {
            let candidate = format!("{hint}_{}", self.next_conflict);
            self.next_conflict += 1;

            if !self.used.contains(&candidate) {
                return self.claim(candidate);
            }
        }
    }

    /// Open a nested region. Names claimed inside it are released by [`Scope::exit_region`].
    pub fn enter_region(&mut self) {
        self.regions.push(Vec::new());
    }

    pub fn exit_region(&mut self) {
        if let Some(names) = self.regions.pop() {
            for name in names {
                self.used.remove(&name);
            }
        }
    }

    fn claim(&mut self, name: String) -> String {
        self.used.insert(name.clone());
        if let Some(region) = self.regions.last_mut() {
            region.push(name.clone());
        }

        format!("%{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_values_are_numbered() {
        let mut scope = Scope::new();

        assert_eq!(scope.anonymous(), "%0");
        assert_eq!(scope.anonymous(), "%1");
    }

    #[test]
    fn conflicting_hints_share_one_counter() {
        let mut scope = Scope::new();

        assert_eq!(scope.named("cst"), "%cst");
        assert_eq!(scope.named("cst"), "%cst_0");
        assert_eq!(scope.named("padded"), "%padded");
        assert_eq!(scope.named("padded"), "%padded_1");
        assert_eq!(scope.named("cst"), "%cst_2");
    }

    #[test]
    fn region_names_are_released() {
        let mut scope = Scope::new();
        scope.argument(0);

        scope.enter_region();
        assert_eq!(scope.named("in"), "%in");
        assert_eq!(scope.named("in"), "%in_0");
        scope.exit_region();

        scope.enter_region();
        assert_eq!(scope.named("in"), "%in");
        scope.exit_region();
    }

    #[test]
    fn arguments_cannot_be_shadowed() {
        let mut scope = Scope::new();

        assert_eq!(scope.argument(0), "%arg0");
        assert_eq!(scope.named("arg0"), "%arg0_0");
    }
}
