//! 左右半球.

use std::fmt;

/// 大脑半球.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Hemisphere {
    /// 左侧.
    Left,

    /// 右侧.
    Right,
}

impl Hemisphere {
    /// 报告中的顺序: 先右后左.
    pub const REPORT_ORDER: [Hemisphere; 2] = [Hemisphere::Right, Hemisphere::Left];

    /// 文件名后缀字母, `L` 或 `R`.
    #[inline]
    pub const fn letter(&self) -> &'static str {
        match self {
            Self::Left => "L",
            Self::Right => "R",
        }
    }
}

impl fmt::Display for Hemisphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => f.write_str("Left"),
            Self::Right => f.write_str("Right"),
        }
    }
}

/// 左右各一份的数据.
///
/// 两侧之间没有任何耦合, 该结构仅用于成对地携带结果.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Hemispheres<T> {
    /// 左侧.
    pub left: T,

    /// 右侧.
    pub right: T,
}

impl<T> Hemispheres<T> {
    /// 由左右两份数据构造.
    #[inline]
    pub fn new(left: T, right: T) -> Self {
        Self { left, right }
    }

    /// 获取某一侧.
    #[inline]
    pub fn get(&self, hemi: Hemisphere) -> &T {
        match hemi {
            Hemisphere::Left => &self.left,
            Hemisphere::Right => &self.right,
        }
    }

    /// 对两侧分别做 `op`.
    pub fn map<U, F: FnMut(Hemisphere, T) -> U>(self, mut op: F) -> Hemispheres<U> {
        let right = op(Hemisphere::Right, self.right);
        let left = op(Hemisphere::Left, self.left);
        Hemispheres { left, right }
    }

    /// 对两侧分别做可失败的 `op`, 右侧先执行. 任一侧失败即返回 `Err`.
    pub fn try_map<U, E, F: FnMut(Hemisphere, T) -> Result<U, E>>(
        self,
        mut op: F,
    ) -> Result<Hemispheres<U>, E> {
        let right = op(Hemisphere::Right, self.right)?;
        let left = op(Hemisphere::Left, self.left)?;
        Ok(Hemispheres { left, right })
    }
}

#[cfg(test)]
mod tests {
    use super::{Hemisphere, Hemispheres};

    #[test]
    fn test_letters_and_order() {
        assert_eq!(Hemisphere::Left.letter(), "L");
        assert_eq!(Hemisphere::Right.letter(), "R");
        assert_eq!(Hemisphere::REPORT_ORDER[0], Hemisphere::Right);
    }

    #[test]
    fn test_try_map_runs_right_first() {
        let mut seen = vec![];
        let pair = Hemispheres::new(1, 2)
            .try_map(|h, v| {
                seen.push(h);
                Ok::<_, ()>(v * 10)
            })
            .unwrap();
        assert_eq!(seen, [Hemisphere::Right, Hemisphere::Left]);
        assert_eq!(pair, Hemispheres::new(10, 20));
    }
}
