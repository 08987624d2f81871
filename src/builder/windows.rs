//! Windows builds
//!
//! Two acquisition paths. The fast one downloads the official installer
//! from python.org/ftp/python and runs it into the work directory. The
//! slow one compiles the msi project: the release layout is probed once
//! up front, the pinned SDK and platform toolset are written into the
//! project files, externals are fetched, PCbuild runs twice (release
//! and debug) and the generated installer is executed locally.
//!
//! Toolchain components are added through the Visual Studio installer
//! for the duration of the build and removed again afterwards.

use super::{make_symlink, BuildContext, Os, OsStrategy};
use crate::builder::env::BuildEnvironment;
use crate::error::{PyforgeError, PyforgeResult};
use crate::exec::{capture_stdout, run_build_step, run_process, ExecOptions};
use crate::fetch;
use async_trait::async_trait;
use regex::Regex;
use semver::Version;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FTP_PYTHON_URL: &str = "https://www.python.org/ftp/python";
const VS_INSTALLER_URL: &str = "https://aka.ms/vs/17/release/vs_installer.exe";

/// Pinned so builds do not chase whatever SDK the image ships
const WINDOWS_SDK: &str = "10.0.17763.0";

const VS_BUILD_DEPENDENCIES: &[&str] = &[
    "Microsoft.VisualStudio.Component.VC.Tools.x86.x64",
    "Microsoft.VisualStudio.Component.VC.v141.x86.x64",
    "Microsoft.VisualStudio.Component.Windows10SDK.17763",
];

const ENV_CL_32: &str = "/D_WIN32";
const ENV_CL_64: &str = "/D_WIN64 /D_AMD64_";

/// What the release tree offers for packaging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowsBuildLayout {
    /// `Tools/msi/build.bat` exists, a full installer can be produced
    MsiProject,
    /// Only `PCbuild` exists, no supported packaging route
    PcBuildOnly,
}

/// Probe the source tree once, before any build step runs
pub fn detect_build_layout(source_root: &Path) -> WindowsBuildLayout {
    if source_root
        .join("Tools")
        .join("msi")
        .join("build.bat")
        .exists()
    {
        WindowsBuildLayout::MsiProject
    } else {
        WindowsBuildLayout::PcBuildOnly
    }
}

/// Platform toolset matching what each release line can compile under
pub fn toolset_for(version: &Version) -> &'static str {
    if *version >= Version::new(3, 11, 0) {
        "v143"
    } else if *version >= Version::new(3, 8, 0) {
        "v142"
    } else if *version >= Version::new(3, 7, 0) {
        "v141"
    } else {
        "v140"
    }
}

/// Rewrite the pinned Windows SDK version in a project file
pub(super) fn patch_sdk_version(content: &str, sdk: &str) -> String {
    let re = Regex::new(r"<DefaultWindowsSDKVersion>[0-9.]+</DefaultWindowsSDKVersion>")
        .expect("static pattern");
    re.replace(
        content,
        format!("<DefaultWindowsSDKVersion>{sdk}</DefaultWindowsSDKVersion>"),
    )
    .into_owned()
}

/// Rewrite the platform toolset in a project file, dropping any
/// condition attribute the original element carried
pub(super) fn patch_toolset(content: &str, toolset: &str) -> String {
    let re = Regex::new(r"<PlatformToolset[^>]*>[^<]+</PlatformToolset>").expect("static pattern");
    re.replace(content, format!("<PlatformToolset>{toolset}</PlatformToolset>"))
        .into_owned()
}

pub struct WindowsStrategy {
    msbuild: String,
    vs_installation_path: String,
}

impl WindowsStrategy {
    pub fn new() -> Self {
        Self {
            msbuild: String::new(),
            vs_installation_path: String::new(),
        }
    }

    fn vs_dependencies(version: &Version) -> Vec<&'static str> {
        let mut dependencies = VS_BUILD_DEPENDENCIES.to_vec();
        if toolset_for(version) == "v140" {
            dependencies.push("Microsoft.VisualStudio.Component.VC.140");
        }
        dependencies
    }

    /// Run the VS installer for every required component
    async fn modify_vs_components(
        &self,
        ctx: &BuildContext,
        action: &str,
    ) -> PyforgeResult<()> {
        let staging = ctx.work_dir.with_file_name("pyforge-vsinstaller");
        let installer = fetch::download(VS_INSTALLER_URL, &staging.join("vs_installer.exe"))?;
        info!("vs_installer downloaded");
        let installer = installer.to_string_lossy().into_owned();
        for dependency in Self::vs_dependencies(&ctx.version) {
            run_process(
                &installer,
                &[
                    "modify",
                    "--installPath",
                    self.vs_installation_path.as_str(),
                    action,
                    dependency,
                    "--quiet",
                    "--norestart",
                    "--force",
                    "--wait",
                ],
                ExecOptions::default(),
            )
            .await?;
        }
        let _ = std::fs::remove_dir_all(&staging);
        info!("vs_installer removed");
        Ok(())
    }

    /// Locate msbuild.exe and the VS installation via vswhere
    async fn discover_toolchain(&mut self) -> PyforgeResult<()> {
        info!("Searching for msbuild.exe");
        let probe = run_process(
            "vswhere",
            &[],
            ExecOptions {
                capture: true,
                ignore_failure: true,
                ..Default::default()
            },
        )
        .await;
        if probe.is_err() {
            run_process(
                "choco",
                &["install", "vswhere"],
                ExecOptions {
                    ignore_failure: true,
                    ..Default::default()
                },
            )
            .await?;
        }
        self.msbuild = capture_stdout(
            "vswhere",
            &[
                "-latest",
                "-requires",
                "Microsoft.Component.MSBuild",
                "-find",
                "MSBuild\\**\\Bin\\MSBuild.exe",
            ],
        )
        .await?;
        info!("Found msbuild.exe at {}", self.msbuild);

        info!("Searching for Visual Studio");
        self.vs_installation_path =
            capture_stdout("vswhere", &["-property", "installationPath"]).await?;
        info!("Found Visual Studio at {}", self.vs_installation_path);
        Ok(())
    }

    /// Run a generated or downloaded installer into the install dir
    async fn run_installer(&self, ctx: &BuildContext, installer: &Path) -> PyforgeResult<PathBuf> {
        let install_dir = ctx.work_dir.join(self.build_suffix());
        let installer_str = installer.to_string_lossy().into_owned();
        let target = install_dir.to_string_lossy().into_owned();
        let extension = installer
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        match extension.as_str() {
            "exe" => {
                let target_arg = format!("TargetDir={target}");
                info!("Running installer {installer_str}");
                run_build_step(
                    "install",
                    &installer_str,
                    &[
                        target_arg.as_str(),
                        "Include_pip=0",
                        "CompileAll=1",
                        "Include_launcher=0",
                        "InstallLauncherAllUsers=0",
                        "/quiet",
                    ],
                    ExecOptions::default(),
                )
                .await?;
            }
            "msi" => {
                let target_arg = format!("TARGETDIR={target}");
                info!("Running msi installer {installer_str}");
                run_build_step(
                    "install",
                    "msiexec",
                    &["/i", installer_str.as_str(), target_arg.as_str(), "/qn"],
                    ExecOptions::default(),
                )
                .await?;
            }
            other => {
                return Err(PyforgeError::Internal(format!(
                    "invalid installer extension, expected exe or msi, got {other}"
                )))
            }
        }
        let python = install_dir.join("python.exe");
        if !python.exists() {
            return Err(PyforgeError::PathNotFound(python));
        }
        info!("Python executable: {}", python.display());
        Ok(install_dir)
    }

    /// Undo toolchain changes and unlock the externals tree
    async fn clean_environment(&self, ctx: &BuildContext) -> PyforgeResult<()> {
        info!("Cleaning environment");
        run_process(
            "taskkill",
            &["/IM", "msbuild.exe", "/F"],
            ExecOptions {
                capture: true,
                ignore_failure: true,
                ..Default::default()
            },
        )
        .await?;

        info!("Removing externals");
        let externals = ctx.work_dir.join("externals");
        run_process(
            "powershell",
            &["attrib", "-h", "-r", "/d", "/s"],
            ExecOptions {
                cwd: Some(&externals),
                ignore_failure: true,
                ..Default::default()
            },
        )
        .await?;

        self.modify_vs_components(ctx, "--remove").await
    }
}

impl Default for WindowsStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OsStrategy for WindowsStrategy {
    fn os(&self) -> Os {
        Os::Windows
    }

    fn cache_key_os(&self) -> &'static str {
        "win32"
    }

    fn build_suffix(&self) -> &'static str {
        "win32pythonInstalledFolder"
    }

    fn interpreter_relpath(&self) -> &'static str {
        "python.exe"
    }

    async fn install_prebuilt(&mut self, ctx: &BuildContext) -> PyforgeResult<Option<PathBuf>> {
        let arch_label = match ctx.arch.as_str() {
            "x64" => "amd64",
            "arm64" => "arm64",
            _ => return Ok(None),
        };
        let filename = format!("python-{}.{arch_label}", ctx.version);
        for extension in ["exe", "msi"] {
            let name = format!("{filename}.{extension}");
            let url = format!("{FTP_PYTHON_URL}/{}/{name}", ctx.version);
            match fetch::download(&url, &ctx.work_dir.join(&name)) {
                Ok(installer) => {
                    info!("Using installer from python.org/ftp/python: {name}");
                    return Ok(Some(self.run_installer(ctx, &installer).await?));
                }
                Err(e) => debug!("No installer at {url}: {e}"),
            }
        }
        info!("No installer found on python.org/ftp/python, will build from source");
        Ok(None)
    }

    async fn prepare_environment(
        &mut self,
        ctx: &BuildContext,
        build_env: &mut BuildEnvironment,
    ) -> PyforgeResult<()> {
        self.discover_toolchain().await?;

        info!("Installing dependencies");
        self.modify_vs_components(ctx, "--add").await?;

        // Pre-3.7 project files do not define the target macros
        if ctx.version < Version::new(3, 7, 0) {
            match ctx.arch.as_str() {
                "x64" => build_env.set("CL", ENV_CL_64),
                "x86" => build_env.set("CL", ENV_CL_32),
                _ => {}
            }
        }
        Ok(())
    }

    async fn build(
        &mut self,
        ctx: &BuildContext,
        build_env: &BuildEnvironment,
    ) -> PyforgeResult<PathBuf> {
        if detect_build_layout(&ctx.work_dir) == WindowsBuildLayout::PcBuildOnly {
            return Err(PyforgeError::build_step(
                "msi project probe",
                "Tools/msi/build.bat",
                1,
            ));
        }

        let toolset = toolset_for(&ctx.version);
        let artifact_dir = match ctx.arch.as_str() {
            "x64" => ctx.work_dir.join("PCbuild").join("amd64").join("en-us"),
            "x86" => ctx.work_dir.join("PCbuild").join("win32").join("en-us"),
            other => return Err(PyforgeError::UnsupportedPlatform(other.to_string())),
        };

        // Pin SDK and toolset in both project files before msbuild sees them
        let props = ctx.work_dir.join("PCbuild").join("python.props");
        let bootstrapper = ctx
            .work_dir
            .join("Tools")
            .join("msi")
            .join("bundle")
            .join("bootstrap")
            .join("pythonba.vcxproj");
        for project in [&props, &bootstrapper] {
            if !project.exists() {
                return Err(PyforgeError::PathNotFound(project.clone()));
            }
            let content = std::fs::read_to_string(project)
                .map_err(|e| PyforgeError::io(format!("reading {}", project.display()), e))?;
            let content = patch_toolset(&patch_sdk_version(&content, WINDOWS_SDK), toolset);
            std::fs::write(project, content)
                .map_err(|e| PyforgeError::io(format!("writing {}", project.display()), e))?;
        }

        info!("Fetching external dependencies");
        let externals_pcbuild = ctx.work_dir.join("PCbuild").join("get_externals.bat");
        let externals_msi = ctx.work_dir.join("Tools").join("msi").join("get_externals.bat");
        for script in [&externals_pcbuild, &externals_msi] {
            if !script.exists() {
                return Err(PyforgeError::PathNotFound(script.clone()));
            }
            let script = script.to_string_lossy().into_owned();
            run_build_step("get externals", &script, &[], ExecOptions::default()).await?;
        }
        if ctx.version < Version::new(3, 7, 0) {
            info!("Detected version <3.7, copying vcredist140.dll to main redist folder");
            let redist = ctx
                .work_dir
                .join("externals")
                .join("windows-installer")
                .join("redist");
            crate::toolcache::copy_tree(&redist.join(&ctx.arch), &redist)?;
        }

        info!("Building Python");
        let pcbuild = ctx
            .work_dir
            .join("PCbuild")
            .join("build.bat")
            .to_string_lossy()
            .into_owned();
        let platform_arg = format!("-p {}", ctx.arch);
        let toolset_arg = format!("/p:PlatformToolset={toolset}");
        let sdk_arg = format!("/p:WindowsTargetPlatformVersion={WINDOWS_SDK}");
        let opts = || ExecOptions {
            env: Some(build_env),
            ..Default::default()
        };
        run_build_step(
            "build python",
            &pcbuild,
            &[platform_arg.as_str(), "-e", toolset_arg.as_str(), sdk_arg.as_str()],
            opts(),
        )
        .await?;
        info!("Building Python debug");
        run_build_step(
            "build python debug",
            &pcbuild,
            &[
                platform_arg.as_str(),
                "-d",
                "-e",
                toolset_arg.as_str(),
                sdk_arg.as_str(),
            ],
            opts(),
        )
        .await?;

        if ctx.version >= Version::new(3, 7, 0) {
            info!("Building docs");
            let docs = ctx
                .work_dir
                .join("Doc")
                .join("make.bat")
                .to_string_lossy()
                .into_owned();
            run_build_step("build docs", &docs, &["html"], ExecOptions::default()).await?;
        }

        info!("Building installer");
        let launcher = ctx
            .work_dir
            .join("Tools")
            .join("msi")
            .join("launcher")
            .join("launcher.wixproj")
            .to_string_lossy()
            .into_owned();
        let snapshot = ctx
            .work_dir
            .join("Tools")
            .join("msi")
            .join("bundle")
            .join("snapshot.wixproj")
            .to_string_lossy()
            .into_owned();
        // The launcher is always a 32-bit artifact
        let mut launcher_env = build_env.clone();
        launcher_env.set("CL", ENV_CL_32);
        run_build_step(
            "build launcher",
            &self.msbuild,
            &[
                launcher.as_str(),
                "/p:Platform=x86",
                toolset_arg.as_str(),
                sdk_arg.as_str(),
            ],
            ExecOptions {
                env: Some(&launcher_env),
                ..Default::default()
            },
        )
        .await?;
        let snapshot_platform = format!("/p:Platform={}", ctx.arch);
        let mut snapshot_env = build_env.clone();
        snapshot_env.set("CL", "");
        run_build_step(
            "build installer",
            &self.msbuild,
            &[
                snapshot.as_str(),
                snapshot_platform.as_str(),
                toolset_arg.as_str(),
                sdk_arg.as_str(),
            ],
            ExecOptions {
                env: Some(&snapshot_env),
                ..Default::default()
            },
        )
        .await?;

        let installer = find_generated_installer(&artifact_dir)?;
        info!("Installer: {}", installer.display());

        debug!("Cleaning environment");
        self.clean_environment(ctx).await?;

        info!("Installing Python to work directory");
        self.run_installer(ctx, &installer).await
    }

    async fn post_install(
        &mut self,
        ctx: &BuildContext,
        installed: &Path,
        _restored: bool,
    ) -> PyforgeResult<()> {
        if ctx.version.major < 3 {
            info!("No python3 symlink needs to be created, skipping step");
            return Ok(());
        }
        info!("Performing post-install operations");
        let python = installed.join("python.exe");
        if !python.exists() {
            return Err(PyforgeError::PathNotFound(python));
        }
        info!("Creating python3 symlink");
        make_symlink(&python, &installed.join("python3.exe"))
    }
}

/// Pick the single generated `python-*.exe` installer artifact
fn find_generated_installer(artifact_dir: &Path) -> PyforgeResult<PathBuf> {
    let entries = std::fs::read_dir(artifact_dir)
        .map_err(|e| PyforgeError::io(format!("reading {}", artifact_dir.display()), e))?;
    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PyforgeError::io("reading installer artifacts", e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("python-") && name.ends_with(".exe") {
            candidates.push(name);
        }
    }
    if candidates.len() != 1 {
        return Err(PyforgeError::Internal(format!(
            "expected one installer candidate, got {candidates:?}"
        )));
    }
    Ok(artifact_dir.join(&candidates[0]))
}
