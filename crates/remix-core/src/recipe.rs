use crate::inventory::PackageInventory;
use std::fmt;

/// Dockerfile text for the rebuilt image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecipe(String);

impl BuildRecipe {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for BuildRecipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Dockerfile installing `packages` on top of `base_image`.
///
/// The install step always uses apt-get, whichever manager the old image had.
/// An empty inventory still produces a complete, no-op install step.
pub fn generate(base_image: &str, packages: &PackageInventory) -> BuildRecipe {
    BuildRecipe(format!(
        "FROM {base_image}\n\
         \n\
         RUN apt-get update && \\\n    \
         apt-get install -y \\\n    \
         {packages} && \\\n    \
         rm -rf /var/lib/apt/lists/*\n",
        packages = packages.packages().join(" "),
    ))
}
