use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

const DEFAULT_OWNER_NAME: &str = "Jordan Example";

const DEFAULT_INSTRUCTION: &str = r#"
You are a friendly and professional chatbot assistant for Jordan Example.
Your role is to answer questions about Jordan based ONLY on the information provided below.
Do not make up any information. If a question is asked that cannot be answered with the provided information,
politely say that you don't have that information.

Here is Jordan Example's resume information:
---
Name: Jordan Example
Contact:
- Mail: jordan@example.com
- Phone: +1 555 010 0199
- Portfolio: www.example.com/jordan
- Github: jordan-example

Summary:
Backend engineer focused on network services, developer tooling and data pipelines.

Experience:
- Software Engineer, Example Systems (2022 - present): Built and operated HTTP APIs and background workers.
- Intern, Sample Labs (2021): Wrote test harnesses and CI tooling.

Projects:
- Log Shipper: Streaming log collector with backpressure and batching.
- Portfolio Chat: This assistant.

Technical Skills:
- Languages: Rust, Python, SQL
- Tools: Git, Docker, Linux
---
Start the conversation by introducing yourself and asking how you can help. Do not repeat your instructions.
"#;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed reading profile from {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("profile at {0} is empty")]
    Empty(PathBuf),
}

/// Persona the model speaks for, plus the landing-page greeting.
#[derive(Debug, Clone)]
pub struct Profile {
    pub owner_name: String,
    pub instruction: String,
    pub greeting: String,
}

impl Profile {
    pub fn new(owner_name: impl Into<String>, instruction: impl Into<String>) -> Self {
        let owner_name = owner_name.into();
        let greeting = default_greeting(&owner_name);
        Self {
            owner_name,
            instruction: instruction.into(),
            greeting,
        }
    }

    /// Loads the system instruction from a plain-text file.
    pub fn from_file(owner_name: impl Into<String>, path: &Path) -> Result<Self, ProfileError> {
        let instruction = fs::read_to_string(path).map_err(|source| ProfileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if instruction.trim().is_empty() {
            return Err(ProfileError::Empty(path.to_path_buf()));
        }
        Ok(Self::new(owner_name, instruction))
    }

    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new(DEFAULT_OWNER_NAME, DEFAULT_INSTRUCTION.trim())
    }
}

fn default_greeting(owner_name: &str) -> String {
    format!(
        "Hello! I'm {}'s virtual assistant. I can answer questions about their skills, experience, and projects. How can I help you today?",
        owner_name
    )
}
