//! Exit-code success policy per external tool.
//!
//! Every tool-specific quirk lives in [`ToolKind::accepted_exit_codes`].

use std::fmt;

/// Classification of an external process, selecting its success policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// Version-control client and anything without known quirks.
    Generic,
    /// Cocos Creator, which exits 36 on some builds that completed correctly.
    ContentBuildTool,
    /// The Gradle wrapper.
    PackagingTool,
}

impl ToolKind {
    /// Exit codes that count as success for this tool.
    pub const fn accepted_exit_codes(self) -> &'static [i32] {
        match self {
            Self::Generic => &[0],
            Self::ContentBuildTool => &[0, 36],
            Self::PackagingTool => &[0],
        }
    }

    pub fn accepts(self, code: i32) -> bool {
        self.accepted_exit_codes().contains(&code)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic => f.write_str("generic tool"),
            Self::ContentBuildTool => f.write_str("content build tool"),
            Self::PackagingTool => f.write_str("packaging tool"),
        }
    }
}
