//! 飞行模式表
//!
//! ArduCopter 的 custom_mode 编号与名称的映射。

/// ArduCopter 自定义模式表
const COPTER_MODES: &[(&str, u32)] = &[
    ("STABILIZE", 0),
    ("ACRO", 1),
    ("ALT_HOLD", 2),
    ("AUTO", 3),
    ("GUIDED", 4),
    ("LOITER", 5),
    ("RTL", 6),
    ("CIRCLE", 7),
    ("LAND", 9),
    ("DRIFT", 11),
    ("SPORT", 13),
    ("FLIP", 14),
    ("AUTOTUNE", 15),
    ("POSHOLD", 16),
    ("BRAKE", 17),
    ("THROW", 18),
    ("AVOID_ADSB", 19),
    ("GUIDED_NOGPS", 20),
    ("SMART_RTL", 21),
    ("FLOWHOLD", 22),
    ("FOLLOW", 23),
    ("ZIGZAG", 24),
    ("SYSTEMID", 25),
    ("AUTOROTATE", 26),
    ("AUTO_RTL", 27),
];

/// 模式名称 <-> custom_mode 映射
#[derive(Debug, Clone, Copy)]
pub struct FlightModeMap {
    table: &'static [(&'static str, u32)],
}

impl FlightModeMap {
    /// 多旋翼（ArduCopter）模式表
    pub const fn copter() -> Self {
        Self {
            table: COPTER_MODES,
        }
    }

    /// 名称查 ID，大小写不敏感
    pub fn id(&self, name: &str) -> Option<u32> {
        let name = name.trim();
        self.table
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, id)| id)
    }

    /// ID 查名称；未收录的编号显示为 `Mode(<id>)`
    pub fn name(&self, id: u32) -> String {
        self.table
            .iter()
            .find(|&&(_, mode_id)| mode_id == id)
            .map(|&(n, _)| n.to_string())
            .unwrap_or_else(|| format!("Mode({})", id))
    }
}

impl Default for FlightModeMap {
    fn default() -> Self {
        Self::copter()
    }
}
