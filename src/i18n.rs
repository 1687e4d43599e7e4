/// Simple localization support for the packpress CLI.
/// Locale is selected via the `--locale` flag (e.g. `--locale zh`).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl Locale {
    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "zh" | "zh-cn" | "zh_cn" | "zh-hans" | "zh-tw" | "zh_tw" => Self::Zh,
            _ => Self::En,
        }
    }
}

pub struct Messages {
    pub selecting: &'static str,
    pub accepted: &'static str,
    pub rejected: &'static str,
    pub advisory_rejected: &'static str,
    pub uploading: &'static str,
    pub optimize_done: &'static str,
    pub optimize_failed: &'static str,
    pub summary_header: &'static str,
    pub original_label: &'static str,
    pub optimized_label: &'static str,
    pub ratio_label: &'static str,
    pub files_label: &'static str,
    pub bytes_saved_label: &'static str,
    pub actual_saved_label: &'static str,
    pub categories_header: &'static str,
    pub saved_to: &'static str,
    pub check_valid: &'static str,
    pub check_invalid: &'static str,
    pub error_prefix: &'static str,
    pub info_prefix: &'static str,
}

pub static EN: Messages = Messages {
    selecting: "checking file",
    accepted: "file accepted",
    rejected: "file rejected",
    advisory_rejected: "rejected by server-side validation",
    uploading: "uploading and optimizing",
    optimize_done: "optimization finished",
    optimize_failed: "optimization failed",
    summary_header: "Optimization summary",
    original_label: "original size",
    optimized_label: "optimized size",
    ratio_label: "compression ratio",
    files_label: "files optimized",
    bytes_saved_label: "bytes saved (per file)",
    actual_saved_label: "bytes saved (container)",
    categories_header: "By category",
    saved_to: "saved to",
    check_valid: "file looks valid",
    check_invalid: "file is invalid",
    error_prefix: "[ERR]",
    info_prefix: "[INFO]",
};

pub static ZH: Messages = Messages {
    selecting: "正在检查文件",
    accepted: "文件已接受",
    rejected: "文件被拒绝",
    advisory_rejected: "被服务端校验拒绝",
    uploading: "正在上传并优化",
    optimize_done: "优化完成",
    optimize_failed: "优化失败",
    summary_header: "优化结果汇总",
    original_label: "原始大小",
    optimized_label: "优化后大小",
    ratio_label: "压缩率",
    files_label: "优化文件数",
    bytes_saved_label: "节省字节（按文件）",
    actual_saved_label: "节省字节（整包）",
    categories_header: "按类别",
    saved_to: "已保存到",
    check_valid: "文件校验通过",
    check_invalid: "文件无效",
    error_prefix: "[错误]",
    info_prefix: "[信息]",
};

pub fn messages(locale: Locale) -> &'static Messages {
    match locale {
        Locale::En => &EN,
        Locale::Zh => &ZH,
    }
}
