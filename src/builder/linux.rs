//! Linux source builds
//!
//! Uses the autotools pipeline: apt-provisioned headers, `./configure`
//! with version-dependent flags, then `make` and `make install` into
//! the work directory. Old release lines need an older gcc and the
//! 1.0.2 OpenSSL line, both provisioned here.

use super::{make_symlink, BuildContext, Os, OsStrategy};
use crate::builder::env::BuildEnvironment;
use crate::error::PyforgeResult;
use crate::exec::{run_build_step, run_process, ExecOptions};
use crate::fetch;
use async_trait::async_trait;
use semver::Version;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Headers and tools every CPython line needs on Ubuntu
const APT_DEPENDENCIES: &[&str] = &[
    "build-essential",
    "libbz2-dev",
    "libffi-dev",
    "libgdbm-dev",
    "liblzma-dev",
    "libncurses5-dev",
    "libreadline-dev",
    "libsqlite3-dev",
    "libssl-dev",
    "tk-dev",
    "uuid-dev",
    "zlib1g-dev",
];

/// The 1.0.2 OpenSSL line, gone from current Ubuntu archives
const LIBSSL_102_URL: &str =
    "http://archive.ubuntu.com/ubuntu/pool/main/o/openssl/libssl1.0.0_1.0.2g-1ubuntu4.20_amd64.deb";
const LIBSSL_DEV_102_URL: &str =
    "http://archive.ubuntu.com/ubuntu/pool/main/o/openssl/libssl-dev_1.0.2g-1ubuntu4.20_amd64.deb";

pub struct LinuxStrategy {
    old_ssl_installed: bool,
}

impl LinuxStrategy {
    pub fn new() -> Self {
        Self {
            old_ssl_installed: false,
        }
    }

    async fn install_old_ssl(&mut self, ctx: &BuildContext) -> PyforgeResult<()> {
        if self.old_ssl_installed {
            info!("libssl 1.0.2 already installed, doing nothing");
            return Ok(());
        }
        info!("Installing libssl and libssl-dev version 1.0.2");
        let staging = ctx.work_dir.with_file_name("pyforge-libssl102");
        for url in [LIBSSL_102_URL, LIBSSL_DEV_102_URL] {
            let name = url.rsplit('/').next().unwrap_or("libssl.deb");
            let deb = fetch::download(url, &staging.join(name))?;
            let deb = deb.to_string_lossy().into_owned();
            run_process(
                "sudo",
                &["dpkg", "-i", "--force-confold", deb.as_str()],
                ExecOptions::default(),
            )
            .await?;
        }
        let _ = std::fs::remove_dir_all(&staging);
        self.old_ssl_installed = true;
        Ok(())
    }
}

impl Default for LinuxStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OsStrategy for LinuxStrategy {
    fn os(&self) -> Os {
        Os::Linux
    }

    fn cache_key_os(&self) -> &'static str {
        "nix"
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
        let mut apt_args = vec!["apt", "install", "-y"];
        apt_args.extend_from_slice(APT_DEPENDENCIES);
        run_process("sudo", &apt_args, ExecOptions::default()).await?;

        // Recent gcc rejects pre-C99 constructs these trees rely on
        if ctx.version < Version::new(3, 5, 0) {
            info!("Detected version <3.5, using gcc-9");
            run_process("sudo", &["apt", "install", "-y", "gcc-9"], ExecOptions::default())
                .await?;
            build_env.set("CC", "gcc-9");
        } else if ctx.version < Version::new(3, 7, 0) {
            info!("Detected version <3.7, using gcc-10");
            run_process("sudo", &["apt", "install", "-y", "gcc-10"], ExecOptions::default())
                .await?;
            build_env.set("CC", "gcc-10");
        }

        // 3.0.x Makefiles shell out to svnversion at build time
        if ctx.version.major == 3 && ctx.version.minor == 0 {
            info!("Detected version 3.0.x, applying SVNVERSION fix");
            build_env.set("SVNVERSION", "Unversioned directory");
        }

        if ctx.version < Version::new(3, 5, 0) {
            info!("Detected version <3.5, older ssl library will be used");
            self.install_old_ssl(ctx).await?;
        }
        Ok(())
    }

    async fn build(
        &mut self,
        ctx: &BuildContext,
        build_env: &BuildEnvironment,
    ) -> PyforgeResult<PathBuf> {
        let install_dir = ctx.work_dir.join(self.build_suffix());
        let prefix = format!("--prefix={}", install_dir.display());
        let mut flags = vec![prefix.as_str(), "--enable-shared"];
        if ctx.version < Version::new(3, 0, 0) {
            flags.push("--enable-unicode=ucs4");
        }
        if ctx.version >= Version::new(3, 6, 0) {
            flags.push("--enable-loadable-sqlite-extensions");
        }
        if ctx.version >= Version::new(3, 7, 0) {
            flags.push("--enable-optimizations");
        }
        debug!("Configure flags: {flags:?}");

        let opts = || ExecOptions {
            cwd: Some(&ctx.work_dir),
            env: Some(build_env),
            ..Default::default()
        };
        info!("Configuring makefile");
        run_build_step("configure", "./configure", &flags, opts()).await?;
        info!("Running make");
        run_build_step("make", "make", &[], opts()).await?;
        info!("Running make install");
        run_build_step("make install", "make", &["install"], opts()).await?;

        Ok(install_dir)
    }

    async fn post_install(
        &mut self,
        ctx: &BuildContext,
        installed: &Path,
        _restored: bool,
    ) -> PyforgeResult<()> {
        info!("Performing post-install operations");
        if ctx.version < Version::new(3, 5, 0) {
            self.install_old_ssl(ctx).await?;
        }

        let (major, minor) = (ctx.version.major, ctx.version.minor);
        let python_executable = installed.join("bin").join(format!("python{major}.{minor}"));

        info!("Creating python symlinks");
        let main_executable = installed.join("python");
        make_symlink(&python_executable, &main_executable)?;
        let bin_executable = installed.join("bin").join(format!("python{major}{minor}"));
        make_symlink(&python_executable, &bin_executable)?;
        // 3.0 installs no python3 binary of its own
        if major == 3 && minor == 0 {
            make_symlink(&python_executable, &installed.join("bin").join("python3"))?;
        }

        for executable in [
            python_executable,
            main_executable,
            bin_executable,
            installed.join("bin").join("python3"),
        ] {
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
