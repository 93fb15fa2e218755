//! Closed role and class vocabulary

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;

/// In-meeting role a participant plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoleTag {
    Tank,
    #[serde(rename = "DPS")]
    Dps,
    Buff,
    /// Valid for every class
    Boss,
}

impl RoleTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleTag::Tank => "Tank",
            RoleTag::Dps => "DPS",
            RoleTag::Buff => "Buff",
            RoleTag::Boss => "Boss",
        }
    }

    pub fn all() -> &'static [RoleTag] {
        &[RoleTag::Tank, RoleTag::Dps, RoleTag::Buff, RoleTag::Boss]
    }
}

impl std::fmt::Display for RoleTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoleTag::all()
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Validation(format!("Unknown role: {}", s)))
    }
}

/// Character class, identified on the wire by its short code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ClassCode {
    #[serde(rename = "BD")]
    BaDao,
    #[serde(rename = "DT")]
    DuocTong,
    #[serde(rename = "TV")]
    ThuongVan,
    #[serde(rename = "DM")]
    DuongMon,
    #[serde(rename = "TCM")]
    TruongCaMon,
    #[serde(rename = "TD")]
    ThuanDuong,
    #[serde(rename = "TS")]
    ThienSach,
    #[serde(rename = "TK")]
    TangKiem,
    #[serde(rename = "CB")]
    CaiBang,
    #[serde(rename = "DT1")]
    DaoTong,
    #[serde(rename = "DT2")]
    DoanThi,
    #[serde(rename = "LTC")]
    LangTuyetCac,
    #[serde(rename = "MG")]
    MinhGiao,
    #[serde(rename = "BL")]
    BongLai,
    #[serde(rename = "TT")]
    ThatTu,
    #[serde(rename = "TL")]
    ThieuLam,
    #[serde(rename = "VH")]
    VanHoa,
    #[serde(rename = "ND")]
    NguDoc,
    #[serde(rename = "VL")]
    VanLinh,
    #[serde(rename = "DTT")]
    DienThienTong,
}

impl ClassCode {
    pub fn code(&self) -> &'static str {
        match self {
            ClassCode::BaDao => "BD",
            ClassCode::DuocTong => "DT",
            ClassCode::ThuongVan => "TV",
            ClassCode::DuongMon => "DM",
            ClassCode::TruongCaMon => "TCM",
            ClassCode::ThuanDuong => "TD",
            ClassCode::ThienSach => "TS",
            ClassCode::TangKiem => "TK",
            ClassCode::CaiBang => "CB",
            ClassCode::DaoTong => "DT1",
            ClassCode::DoanThi => "DT2",
            ClassCode::LangTuyetCac => "LTC",
            ClassCode::MinhGiao => "MG",
            ClassCode::BongLai => "BL",
            ClassCode::ThatTu => "TT",
            ClassCode::ThieuLam => "TL",
            ClassCode::VanHoa => "VH",
            ClassCode::NguDoc => "ND",
            ClassCode::VanLinh => "VL",
            ClassCode::DienThienTong => "DTT",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ClassCode::BaDao => "Bá Đao",
            ClassCode::DuocTong => "Dược Tông",
            ClassCode::ThuongVan => "Thương Vân",
            ClassCode::DuongMon => "Đường Môn",
            ClassCode::TruongCaMon => "Trường Ca Môn",
            ClassCode::ThuanDuong => "Thuần Dương",
            ClassCode::ThienSach => "Thiên Sách",
            ClassCode::TangKiem => "Tàng Kiếm",
            ClassCode::CaiBang => "Cái Bang",
            ClassCode::DaoTong => "Đao Tông",
            ClassCode::DoanThi => "Đoàn Thị",
            ClassCode::LangTuyetCac => "Lăng Tuyết Các",
            ClassCode::MinhGiao => "Minh Giáo",
            ClassCode::BongLai => "Bồng Lai",
            ClassCode::ThatTu => "Thất Tú",
            ClassCode::ThieuLam => "Thiếu Lâm",
            ClassCode::VanHoa => "Vạn Hoa",
            ClassCode::NguDoc => "Ngũ Độc",
            ClassCode::VanLinh => "Vạn Linh",
            ClassCode::DienThienTong => "Diễn Thiên Tông",
        }
    }

    pub fn all() -> &'static [ClassCode] {
        &[
            ClassCode::BaDao,
            ClassCode::DuocTong,
            ClassCode::ThuongVan,
            ClassCode::DuongMon,
            ClassCode::TruongCaMon,
            ClassCode::ThuanDuong,
            ClassCode::ThienSach,
            ClassCode::TangKiem,
            ClassCode::CaiBang,
            ClassCode::DaoTong,
            ClassCode::DoanThi,
            ClassCode::LangTuyetCac,
            ClassCode::MinhGiao,
            ClassCode::BongLai,
            ClassCode::ThatTu,
            ClassCode::ThieuLam,
            ClassCode::VanHoa,
            ClassCode::NguDoc,
            ClassCode::VanLinh,
            ClassCode::DienThienTong,
        ]
    }
}

impl std::fmt::Display for ClassCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ClassCode {
    type Err = Error;

    /// Accepts either the short code or the display name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ClassCode::all()
            .iter()
            .copied()
            .find(|c| c.code().eq_ignore_ascii_case(s) || c.display_name() == s)
            .ok_or_else(|| Error::Validation(format!("Unknown class: {}", s)))
    }
}
