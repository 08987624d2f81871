//! macOS source builds
//!
//! Same autotools pipeline as Linux but with Homebrew-provisioned
//! libraries, whose prefixes have to be spelled out through CFLAGS and
//! LDFLAGS because nothing on darwin looks in the brew cellar by
//! default. The OpenSSL line is picked per release: 1.0.2 (from a
//! pinned formula) below 3.5, 1.1 below 3.9, current otherwise.

use super::{make_symlink, BuildContext, Os, OsStrategy};
use crate::builder::env::BuildEnvironment;
use crate::error::PyforgeResult;
use crate::exec::{capture_stdout, run_build_step, run_process, ExecOptions};
use crate::fetch;
use async_trait::async_trait;
use semver::Version;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const BREW_DEPENDENCIES: &[&str] = &["readline", "sqlite3", "xz", "zlib"];

/// Pinned formula for the retired 1.0.2 line
const OPENSSL_102_FORMULA_URL: &str =
    "https://raw.githubusercontent.com/rajivshah3/homebrew-libressl/master/Formula/openssl@1.0.2t.rb";
const OPENSSL_102_FORMULA_NAME: &str = "openssl@1.0.2t";

pub struct DarwinStrategy {
    ssl_prefix: Option<PathBuf>,
}

impl DarwinStrategy {
    pub fn new() -> Self {
        Self { ssl_prefix: None }
    }

    async fn install_general_dependencies(&self) -> PyforgeResult<()> {
        let mut args = vec!["install"];
        args.extend_from_slice(BREW_DEPENDENCIES);
        run_process(
            "brew",
            &args,
            ExecOptions {
                ignore_failure: true,
                ..Default::default()
            },
        )
        .await?;
        Ok(())
    }

    /// Install the pinned 1.0.2 formula and return its prefix.
    ///
    /// The formula's `make test` phase is stripped before installing:
    /// it fails on current macOS and the library itself is fine.
    async fn install_old_ssl(&mut self, ctx: &BuildContext, restored: bool) -> PyforgeResult<PathBuf> {
        if let Some(prefix) = &self.ssl_prefix {
            info!("Correct version of OpenSSL already installed");
            return Ok(prefix.clone());
        }
        info!("Downloading {OPENSSL_102_FORMULA_URL}");
        let staging = ctx.work_dir.with_file_name("pyforge-openssl102");
        let formula_file = format!("{OPENSSL_102_FORMULA_NAME}.rb");
        let formula = fetch::download(OPENSSL_102_FORMULA_URL, &staging.join(&formula_file))?;
        let content = std::fs::read_to_string(&formula)
            .map_err(|e| crate::error::PyforgeError::io("reading openssl formula", e))?;
        std::fs::write(&formula, content.replace("system \"make\", \"test\"\n", ""))
            .map_err(|e| crate::error::PyforgeError::io("writing openssl formula", e))?;

        let local_formula = format!("./{formula_file}");
        let brew_cmd = if restored { "post_install" } else { "install" };
        run_process(
            "brew",
            &[brew_cmd, local_formula.as_str()],
            ExecOptions {
                cwd: Some(&staging),
                ..Default::default()
            },
        )
        .await?;
        let prefix = capture_stdout("brew", &["--prefix", OPENSSL_102_FORMULA_NAME]).await?;
        let _ = std::fs::remove_dir_all(&staging);
        let prefix = PathBuf::from(prefix);
        self.ssl_prefix = Some(prefix.clone());
        Ok(prefix)
    }

    async fn provision_ssl(&mut self, ctx: &BuildContext, restored: bool) -> PyforgeResult<PathBuf> {
        if ctx.version < Version::new(3, 5, 0) {
            info!("Detected version <3.5, OpenSSL version 1.0.2 will be used");
            self.install_old_ssl(ctx, restored).await
        } else {
            let formula = if ctx.version < Version::new(3, 9, 0) {
                info!("Detected version <3.9, OpenSSL version 1.1 will be used");
                "openssl@1.1"
            } else {
                info!("Detected version >=3.9, default OpenSSL will be used");
                "openssl"
            };
            run_process("brew", &["install", formula], ExecOptions::default()).await?;
            let prefix = capture_stdout("brew", &["--prefix", formula]).await?;
            let prefix = PathBuf::from(prefix);
            self.ssl_prefix = Some(prefix.clone());
            Ok(prefix)
        }
    }
}

impl Default for DarwinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OsStrategy for DarwinStrategy {
    fn os(&self) -> Os {
        Os::Darwin
    }

    fn cache_key_os(&self) -> &'static str {
        "darwin"
    }

    fn build_suffix(&self) -> &'static str {
        "installDir"
    }

    async fn prepare_environment(
        &mut self,
        ctx: &BuildContext,
        build_env: &mut BuildEnvironment,
    ) -> PyforgeResult<()> {
        info!("Installing dependencies");
        run_process(
            "xcode-select",
            &["--install"],
            ExecOptions {
                capture: true,
                ignore_failure: true,
                ..Default::default()
            },
        )
        .await?;
        self.install_general_dependencies().await?;

        let zlib = capture_stdout("brew", &["--prefix", "zlib"]).await?;
        let readline = capture_stdout("brew", &["--prefix", "readline"]).await?;
        let ssl = self.provision_ssl(ctx, false).await?;
        let ssl = ssl.display().to_string();
        info!("OpenSSL path: {ssl}");

        build_env.append_flag("CFLAGS", "-Wno-implicit-function-declaration");
        build_env.append_flag("LDFLAGS", format!("-L{ssl}/lib"));
        build_env.append_flag("LDFLAGS", format!("-L{zlib}/lib"));
        build_env.append_flag("LDFLAGS", format!("-L{readline}/lib"));
        build_env.append_flag("CFLAGS", format!("-I{ssl}/include"));
        build_env.append_flag("CFLAGS", format!("-I{zlib}/include"));
        build_env.append_flag("CFLAGS", format!("-I{readline}/include"));

        if ctx.version.major == 3 && ctx.version.minor == 0 {
            info!("Detected version 3.0.x, applying SVNVERSION fix");
            build_env.set("SVNVERSION", "Unversioned directory");
        }
        Ok(())
    }

    async fn build(
        &mut self,
        ctx: &BuildContext,
        build_env: &BuildEnvironment,
    ) -> PyforgeResult<PathBuf> {
        let mut build_env = build_env.clone();
        let install_dir = ctx.work_dir.join(self.build_suffix());
        let prefix = format!("--prefix={}", install_dir.display());
        let mut flags = vec![prefix.clone(), "--enable-shared".to_string()];
        if ctx.version < Version::new(3, 0, 0) {
            flags.push("--enable-unicode=ucs4".to_string());
        }
        if ctx.version >= Version::new(3, 2, 0) {
            flags.push("--enable-loadable-sqlite-extensions".to_string());
            let sqlite = capture_stdout("brew", &["--prefix", "sqlite3"]).await?;
            debug!("sqlite3 module path: {sqlite}");
            build_env.append_flag("LDFLAGS", format!("-L{sqlite}/lib"));
            build_env.append_flag("CFLAGS", format!("-I{sqlite}/include"));
            build_env.append_flag("CPPFLAGS", format!("-I{sqlite}/include"));
        }
        if ctx.version >= Version::new(3, 7, 0) {
            flags.push("--enable-optimizations".to_string());
            flags.push("--with-lto".to_string());
            if let Some(ssl) = &self.ssl_prefix {
                flags.push(format!("--with-openssl={}", ssl.display()));
            }
        }
        debug!("Configure flags: {flags:?}");

        let flag_refs: Vec<&str> = flags.iter().map(String::as_str).collect();
        let opts = || ExecOptions {
            cwd: Some(&ctx.work_dir),
            env: Some(&build_env),
            ..Default::default()
        };
        info!("Configuring makefile");
        run_build_step("configure", "./configure", &flag_refs, opts()).await?;
        info!("Running make");
        run_build_step("make", "make", &[], opts()).await?;
        info!("Running make install");
        run_build_step("make install", "make", &["install"], opts()).await?;

        Ok(install_dir)
    }

    async fn additional_cache_paths(&mut self, ctx: &BuildContext) -> PyforgeResult<Vec<PathBuf>> {
        // The 1.0.2 cellar has to travel with the build, the formula is
        // not installable from the archive on a cache hit
        if ctx.version >= Version::new(3, 5, 0) {
            return Ok(Vec::new());
        }
        let prefix = capture_stdout("brew", &["--prefix", OPENSSL_102_FORMULA_NAME]).await?;
        let cellar = capture_stdout("brew", &["--cellar", OPENSSL_102_FORMULA_NAME]).await?;
        Ok(vec![PathBuf::from(prefix), PathBuf::from(cellar)])
    }

    async fn post_install(
        &mut self,
        ctx: &BuildContext,
        installed: &Path,
        restored: bool,
    ) -> PyforgeResult<()> {
        info!("Performing post-install operations");
        self.install_general_dependencies().await?;
        self.provision_ssl(ctx, restored).await?;

        let (major, minor) = (ctx.version.major, ctx.version.minor);
        let python_executable = installed.join("bin").join(format!("python{major}.{minor}"));

        info!("Creating python symlinks");
        let main_executable = installed.join("python");
        make_symlink(&python_executable, &main_executable)?;
        let bin_executable = installed.join("bin").join(format!("python{major}{minor}"));
        make_symlink(&python_executable, &bin_executable)?;
        if major == 3 && minor == 0 {
            make_symlink(&python_executable, &installed.join("bin").join("python3"))?;
        }
        let mut executables = vec![python_executable.clone(), main_executable, bin_executable];
        if major >= 3 {
            let main_bin = installed.join("bin").join("python");
            make_symlink(&python_executable, &main_bin)?;
            executables.push(main_bin);
            executables.push(installed.join("bin").join("python3"));
        }

        for executable in executables {
            let path = executable.to_string_lossy().into_owned();
            run_process(
                "chmod",
                &["+x", path.as_str()],
                ExecOptions {
                    capture: true,
                    ignore_failure: true,
                    ..Default::default()
                },
            )
            .await?;
        }
        Ok(())
    }
}
