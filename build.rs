//! # Ndog Panel - Tauri Cargo 构建脚本
//!
//! 根据 `tauri.conf.json` 与 `capabilities/` 生成运行时所需的资源绑定代码，
//! 并在 Windows 平台上生成应用程序清单和资源文件。

fn main() {
  tauri_build::build()
}
