use serde::{Deserialize, Serialize};

/// Уникальный идентификатор узла в дереве сцены
pub type NodeId = String;

/// Идентификатор группы клонов (узлы с одинаковым значением синхронизируются)
pub type CloneGroupId = String;

/// Ссылка на внешний меш в хранилище ассетов (контентный хеш + расширение)
pub type AssetRef = String;

/// Максимальная глубина вложенности сериализованного документа
pub const MAX_DOCUMENT_DEPTH: usize = 256;

/// Текущая версия формата документа
pub const DOCUMENT_VERSION: u32 = 1;

/// Цвет узла в формате RGBA.
///
/// Полностью прозрачный цвет означает «не переопределён»: эффективный цвет
/// берётся у ближайшего предка.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color { r: 0, g: 0, b: 0, a: 0 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255, a: 255 };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn is_transparent(&self) -> bool {
        self.a == 0
    }
}

/// Роль узла при CSG-объединении
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    /// Не переопределено, наследуется от предка
    #[default]
    Default,
    Solid,
    /// Вычитаемый операнд
    Hole,
    /// Поддержки исключаются из CSG-наборов
    Support,
}

/// Явный список узлов-операндов, на которые ссылается операция
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct SelectedChildren(pub Vec<NodeId>);

impl SelectedChildren {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|s| s == id)
    }
}

/// Тип узла в документе
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKindDocument {
    /// Обычный объект (меш и/или дети)
    #[default]
    Object,
    /// Временная группа выделения
    SelectionGroup,
    /// Объединение всех детей
    Combine,
    /// Вычитание выбранных детей из остальных
    Subtract {
        #[serde(default, skip_serializing_if = "SelectedChildren::is_empty")]
        selected_children: SelectedChildren,
    },
}

fn default_true() -> bool {
    true
}

fn identity_matrix() -> [f32; 16] {
    [
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]
}

/// Сериализованный узел дерева.
///
/// Геометрия не встраивается: меш хранится в хранилище ассетов и
/// адресуется через `mesh_path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_id: Option<CloneGroupId>,
    #[serde(default)]
    pub clone_update_count: u64,
    #[serde(default)]
    pub name: String,
    /// Локальная матрица, column-major
    #[serde(default = "identity_matrix")]
    pub matrix: [f32; 16],
    #[serde(default)]
    pub color: Color,
    #[serde(default)]
    pub output_type: OutputType,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_path: Option<AssetRef>,
    #[serde(default)]
    pub kind: NodeKindDocument,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeDocument>,
}

impl NodeDocument {
    /// Пустой узел с единичной матрицей
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            owner_id: None,
            clone_id: None,
            clone_update_count: 0,
            name: String::new(),
            matrix: identity_matrix(),
            color: Color::TRANSPARENT,
            output_type: OutputType::Default,
            visible: true,
            mesh_path: None,
            kind: NodeKindDocument::Object,
            children: Vec::new(),
        }
    }

    /// Глубина поддерева (лист = 1)
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(|c| c.depth()).max().unwrap_or(0)
    }

    /// Количество узлов в поддереве, включая корень
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }
}

/// Документ сцены (.mcx)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    pub root: NodeDocument,
}

fn default_version() -> u32 {
    DOCUMENT_VERSION
}

impl SceneDocument {
    pub fn new(root: NodeDocument) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Serialize + for<'de> Deserialize<'de> + PartialEq + std::fmt::Debug>(val: &T) {
        let json = serde_json::to_string(val).unwrap();
        let back: T = serde_json::from_str(&json).unwrap();
        assert_eq!(*val, back);
    }

    #[test]
    fn test_node_document_serde() {
        let mut node = NodeDocument::new("root");
        node.name = "Root".to_string();
        let mut child = NodeDocument::new("child");
        child.mesh_path = Some("abc.stl".to_string());
        child.output_type = OutputType::Hole;
        node.children.push(child);
        roundtrip(&node);
    }

    #[test]
    fn test_subtract_kind_serde() {
        let kind = NodeKindDocument::Subtract {
            selected_children: SelectedChildren(vec!["a".to_string(), "b".to_string()]),
        };
        roundtrip(&kind);
        let json = serde_json::to_string(&kind).unwrap();
        assert!(json.contains(r#""type":"subtract""#));
        assert!(json.contains(r#""selected_children":["a","b"]"#));
    }

    #[test]
    fn test_minimal_document_defaults() {
        let json = r#"{"root": {"id": "r"}}"#;
        let doc: SceneDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.version, DOCUMENT_VERSION);
        assert!(doc.root.visible);
        assert_eq!(doc.root.matrix, identity_matrix());
        assert_eq!(doc.root.kind, NodeKindDocument::Object);
        assert!(doc.root.color.is_transparent());
    }

    #[test]
    fn test_output_type_names() {
        let json = serde_json::to_string(&OutputType::Support).unwrap();
        assert_eq!(json, r#""support""#);
    }

    #[test]
    fn test_depth_and_count() {
        let mut root = NodeDocument::new("r");
        let mut a = NodeDocument::new("a");
        a.children.push(NodeDocument::new("b"));
        root.children.push(a);
        root.children.push(NodeDocument::new("c"));
        assert_eq!(root.depth(), 3);
        assert_eq!(root.node_count(), 4);
    }

    #[test]
    fn test_scene_document_serde() {
        let doc = SceneDocument::new(NodeDocument::new("root"));
        roundtrip(&doc);
    }
}
