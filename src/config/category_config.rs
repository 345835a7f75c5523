use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Built-in subcategory -> main category table used by the product catalog.
const SUBCATEGORY_TABLE: &[(&str, &str)] = &[
    ("智能手机", "电子产品"),
    ("笔记本电脑", "电子产品"),
    ("平板电脑", "电子产品"),
    ("智能手表", "电子产品"),
    ("耳机", "电子产品"),
    ("音响", "电子产品"),
    ("相机", "电子产品"),
    ("摄像机", "电子产品"),
    ("游戏机", "电子产品"),
    ("上衣", "服装"),
    ("裤子", "服装"),
    ("裙子", "服装"),
    ("内衣", "服装"),
    ("鞋子", "服装"),
    ("帽子", "服装"),
    ("手套", "服装"),
    ("围巾", "服装"),
    ("外套", "服装"),
    ("零食", "食品"),
    ("饮料", "食品"),
    ("调味品", "食品"),
    ("米面", "食品"),
    ("水产", "食品"),
    ("肉类", "食品"),
    ("蛋奶", "食品"),
    ("水果", "食品"),
    ("蔬菜", "食品"),
    ("家具", "家居"),
    ("床上用品", "家居"),
    ("厨具", "家居"),
    ("卫浴用品", "家居"),
    ("文具", "办公"),
    ("办公用品", "办公"),
    ("健身器材", "运动户外"),
    ("户外装备", "运动户外"),
    ("玩具", "玩具"),
    ("模型", "玩具"),
    ("益智玩具", "玩具"),
    ("婴儿用品", "母婴"),
    ("儿童课外读物", "母婴"),
    ("车载电子", "汽车用品"),
    ("汽车装饰", "汽车用品"),
];

#[derive(Debug, Deserialize)]
struct CategoryTableFile {
    categories: HashMap<String, String>,
}

/// Read-only subcategory -> main category lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct SubcategoryMap {
    mapping: HashMap<String, String>,
}

impl Default for SubcategoryMap {
    fn default() -> Self {
        SUBCATEGORY_TABLE
            .iter()
            .map(|(sub, main)| (sub.to_string(), main.to_string()))
            .collect()
    }
}

impl FromIterator<(String, String)> for SubcategoryMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        SubcategoryMap {
            mapping: iter.into_iter().collect(),
        }
    }
}

impl SubcategoryMap {
    /// Load a replacement table from a TOML file with a `[categories]` map.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read category table: {}", path.display()))?;

        let file: CategoryTableFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse category table: {}", path.display()))?;

        Ok(file.categories.into_iter().collect())
    }

    /// Built-in table unless a replacement file is configured.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn main_category(&self, subcategory: &str) -> Option<&str> {
        self.mapping.get(subcategory).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}
