pub mod assets;
pub mod files;
pub mod jobs;
pub mod mcp;
