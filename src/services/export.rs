use crate::models::{BuildKind, ProjectSettings};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt::Write as _;
use std::fs;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Build systems the project can be exported to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    CMake,
}

impl ExportFormat {
    /// File written into the project root
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::CMake => "CMakeLists.txt",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cmake" => Ok(Self::CMake),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Render `CMakeLists.txt` contents for the project
pub fn render_cmake(settings: &ProjectSettings) -> String {
    let target = settings.build.output_name.replace(' ', "_");
    let project = settings.name.replace(' ', "_");
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(out, "cmake_minimum_required(VERSION 3.10)");
    let _ = writeln!(out, "project({})", project);

    let target_kind = match settings.build.kind {
        BuildKind::Executable => "add_executable",
        BuildKind::StaticArchive => "add_library",
        BuildKind::SharedLibrary => "add_library",
    };
    let library_kind = match settings.build.kind {
        BuildKind::Executable => "",
        BuildKind::StaticArchive => " STATIC",
        BuildKind::SharedLibrary => " SHARED",
    };
    let _ = writeln!(
        out,
        "{}({}{} {})",
        target_kind,
        target,
        library_kind,
        settings.src_files.join(" ")
    );

    if !settings.include_dirs.is_empty() {
        let dirs: Vec<String> = settings
            .include_dirs
            .iter()
            .map(|dir| {
                if Utf8Path::new(dir).is_absolute() {
                    dir.clone()
                } else {
                    format!("${{CMAKE_CURRENT_SOURCE_DIR}}/{}", dir)
                }
            })
            .collect();
        let _ = writeln!(out, "target_include_directories({} PRIVATE {})", target, dirs.join(" "));
    }

    if !settings.static_linked_dirs.is_empty() {
        let _ = writeln!(
            out,
            "target_link_directories({} PRIVATE {})",
            target,
            settings.static_linked_dirs.join(" ")
        );
    }

    if !settings.static_linked.is_empty() {
        let _ = writeln!(
            out,
            "target_link_libraries({} PRIVATE {})",
            target,
            settings.static_linked.join(" ")
        );
    }

    if !settings.defines.is_empty() {
        let defines: Vec<String> = settings
            .defines
            .iter()
            .map(|(name, value)| {
                if value.is_empty() {
                    name.clone()
                } else {
                    format!("{}={}", name, value)
                }
            })
            .collect();
        let _ = writeln!(out, "target_compile_definitions({} PRIVATE {})", target, defines.join(" "));
    }

    if !settings.dependencies.is_empty() {
        let _ = writeln!(out, "# Dependencies:");
        for (name, version) in &settings.dependencies {
            let _ = writeln!(out, "# {} {}", name, version);
        }
    }

    out
}

/// Write the export file into the project root and return its path
pub fn export(settings: &ProjectSettings, format: ExportFormat) -> Result<Utf8PathBuf, ExportError> {
    let contents = match format {
        ExportFormat::CMake => render_cmake(settings),
    };
    let path = settings.root.join(format.file_name());

    fs::write(&path, contents).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;

    tracing::info!("Generated {}", path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(root: impl Into<Utf8PathBuf>) -> ProjectSettings {
        let mut settings = ProjectSettings::new(root, "my app");
        settings.src_files = vec!["src/main.cpp".to_string(), "src/util.cpp".to_string()];
        settings.include_dirs = vec!["include".to_string(), "/opt/zlib/include".to_string()];
        settings.static_linked = vec!["z".to_string()];
        settings.static_linked_dirs = vec!["/opt/zlib/lib".to_string()];
        settings
            .dependencies
            .insert("zlib".to_string(), "1.3.1".to_string());
        settings
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("cmake".parse::<ExportFormat>().unwrap(), ExportFormat::CMake);
        assert_eq!("CMake".parse::<ExportFormat>().unwrap(), ExportFormat::CMake);
        assert!(matches!(
            "meson".parse::<ExportFormat>(),
            Err(ExportError::UnsupportedFormat(f)) if f == "meson"
        ));
    }

    #[test]
    fn test_render_cmake_executable() {
        let text = render_cmake(&sample("/work/demo"));

        assert!(text.starts_with("cmake_minimum_required(VERSION 3.10)\nproject(my_app)\n"));
        assert!(text.contains("add_executable(my_app src/main.cpp src/util.cpp)"));
        assert!(text.contains(
            "target_include_directories(my_app PRIVATE ${CMAKE_CURRENT_SOURCE_DIR}/include /opt/zlib/include)"
        ));
        assert!(text.contains("target_link_directories(my_app PRIVATE /opt/zlib/lib)"));
        assert!(text.contains("target_link_libraries(my_app PRIVATE z)"));
        assert!(text.contains("# zlib 1.3.1"));
    }

    #[test]
    fn test_render_cmake_static_library() {
        let mut settings = sample("/work/demo");
        settings.build.kind = BuildKind::StaticArchive;
        settings.build.output_name = "core".to_string();

        let text = render_cmake(&settings);
        assert!(text.contains("add_library(core STATIC src/main.cpp src/util.cpp)"));
    }

    #[test]
    fn test_export_writes_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();

        let path = export(&sample(&root), ExportFormat::CMake).unwrap();

        assert_eq!(path, root.join("CMakeLists.txt"));
        assert!(fs::read_to_string(&path).unwrap().contains("project(my_app)"));
    }
}
