//! 命令行程序依赖的通用组件.

pub mod tools;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep_to<W: std::io::Write>(mut w: W) -> std::io::Result<()> {
    writeln!(&mut w, "{SEP}")
}

/// 用分隔线包围 `text` 写入 `w`.
pub fn framed_to<W: std::io::Write>(mut w: W, text: &str) -> std::io::Result<()> {
    sep_to(&mut w)?;
    write!(&mut w, "{text}")?;
    if !text.ends_with('\n') {
        writeln!(&mut w)?;
    }
    sep_to(&mut w)
}
