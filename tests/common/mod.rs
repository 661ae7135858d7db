#![allow(dead_code)]

mod mocks;

pub use mocks::MockSink;

use serde::{Deserialize, Serialize};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BuildSystem {
    Maven,
    Gradle,
    Bazel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    pub build_system: BuildSystem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    pub package: String,
    pub project: Option<ProjectInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestMethod {
    pub name: String,
    pub class_info: ClassInfo,
    pub annotations: Vec<String>,
    pub position: (u32, u32),
}

pub const METHOD_HEADER: [&str; 9] = [
    "name",
    "class_info.name",
    "class_info.package",
    "class_info.project.name",
    "class_info.project.build_system",
    "annotations[0]",
    "annotations[1]",
    "position[0]",
    "position[1]",
];

fn core_project() -> Option<ProjectInfo> {
    Some(ProjectInfo {
        name: "core".to_string(),
        build_system: BuildSystem::Gradle,
    })
}

/// Three methods: the first has the longest annotation list, the last one has
/// no project, no package and a line break in its name.
pub fn sample_methods() -> Vec<TestMethod> {
    vec![
        TestMethod {
            name: "parsesEmptyInput".to_string(),
            class_info: ClassInfo {
                name: "ParserTest".to_string(),
                package: "org.example.parser".to_string(),
                project: core_project(),
            },
            annotations: vec!["Test".to_string(), "Slow".to_string()],
            position: (12, 5),
        },
        TestMethod {
            name: "handles \"quoted\", text".to_string(),
            class_info: ClassInfo {
                name: "QuoteTest".to_string(),
                package: "org.example.parser".to_string(),
                project: core_project(),
            },
            annotations: vec!["Test".to_string()],
            position: (40, 9),
        },
        TestMethod {
            name: "multi\nline".to_string(),
            class_info: ClassInfo {
                name: "Orphan".to_string(),
                package: String::new(),
                project: None,
            },
            annotations: Vec::new(),
            position: (1, 1),
        },
    ]
}
