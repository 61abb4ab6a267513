use std::{
    fs,
    path::{Path, PathBuf},
};

/// Upper bound on the number of labels read from a class file.
pub const MAX_LABELS: usize = 1000;

/// Human readable class names, one per line, indexed by class id.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    /// Load labels from `file`, falling back to `../file` and `./data/file`.
    ///
    /// A missing file is not an error: predictions are then reported as
    /// `class_<id>`.
    pub fn load<P: AsRef<Path>>(file: P) -> Self {
        let file = file.as_ref();

        for candidate in candidates(file) {
            if let Ok(content) = fs::read_to_string(&candidate) {
                let labels = Self::parse(&content);
                log::debug!(
                    "Loaded {} class labels from {}",
                    labels.len(),
                    candidate.display()
                );
                return labels;
            }
        }

        log::warn!("Could not load class labels from {}", file.display());
        Self::default()
    }

    /// Skips empty lines and keeps the text before the first comma of each line.
    pub fn parse(content: &str) -> Self {
        let names = content
            .lines()
            .map(|line| line.trim_end_matches(['\r', '\n']))
            .filter(|line| !line.is_empty())
            .map(|line| line.split(',').next().unwrap_or(line).to_string())
            .take(MAX_LABELS)
            .collect();

        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, class: usize) -> String {
        match self.names.get(class) {
            Some(name) => name.clone(),
            None => format!("class_{class}"),
        }
    }
}

fn candidates(file: &Path) -> Vec<PathBuf> {
    vec![
        file.to_path_buf(),
        Path::new("..").join(file),
        Path::new(".").join("data").join(file),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_text_before_the_first_comma() {
        let labels = ClassLabels::parse(
            "tench, Tinca tinca\r\ngoldfish, Carassius auratus\n\ngreat white shark\n",
        );

        assert_eq!(labels.len(), 3);
        assert_eq!(labels.name(0), "tench");
        assert_eq!(labels.name(1), "goldfish");
        assert_eq!(labels.name(2), "great white shark");
    }

    #[test]
    fn unknown_classes_fall_back_to_their_id() {
        let labels = ClassLabels::parse("tench\n");

        assert_eq!(labels.name(1), "class_1");
        assert_eq!(ClassLabels::default().name(42), "class_42");
    }

    #[test]
    fn reads_at_most_a_thousand_labels() {
        let content = (0..1200).map(|i| format!("label {i}\n")).collect::<String>();

        let labels = ClassLabels::parse(&content);

        assert_eq!(labels.len(), MAX_LABELS);
        assert_eq!(labels.name(999), "label 999");
        assert_eq!(labels.name(1000), "class_1000");
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classes.txt");
        fs::write(&path, "tench, Tinca tinca\ngoldfish\n").unwrap();

        let labels = ClassLabels::load(&path);

        assert_eq!(labels.len(), 2);
        assert_eq!(labels.name(1), "goldfish");
    }

    #[test]
    fn missing_file_gives_empty_labels() {
        let labels = ClassLabels::load("no/such/imagenet_classes.txt");

        assert!(labels.is_empty());
    }
}
