// ==========================================
// 起重机设备台账导入系统 - 设备与事件领域模型
// ==========================================
// 对齐: equipment / equipment_event 表
// ==========================================

use crate::domain::types::{EventKind, LinkTier};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ==========================================
// EntityAttributes - 设备属性
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityAttributes {
    pub display_name: Option<String>,          // 设备名称
    pub section: Option<String>,               // 所属工厂/工段
    pub grade: Option<String>,                 // 等级
    pub drive_type: Option<String>,            // 驱动方式
    pub unmanned_operation: Option<String>,    // 无人化运行标记
    pub location: Option<String>,              // 安装位置
    pub model: Option<String>,                 // 型号（起升装置）
    pub installation_date: Option<NaiveDate>,  // 安装日期
    pub inspection_date: Option<NaiveDate>,    // 点检基准日
}

impl EntityAttributes {
    /// 逐字段覆盖: 仅当 `other` 的字段有值时覆盖
    ///
    /// # 返回
    /// - 实际被覆盖的字段数
    pub fn overlay(&mut self, other: &EntityAttributes) -> usize {
        fn apply<T: Clone + PartialEq>(slot: &mut Option<T>, incoming: &Option<T>) -> usize {
            match incoming {
                Some(v) if slot.as_ref() != Some(v) => {
                    *slot = Some(v.clone());
                    1
                }
                _ => 0,
            }
        }

        apply(&mut self.display_name, &other.display_name)
            + apply(&mut self.section, &other.section)
            + apply(&mut self.grade, &other.grade)
            + apply(&mut self.drive_type, &other.drive_type)
            + apply(&mut self.unmanned_operation, &other.unmanned_operation)
            + apply(&mut self.location, &other.location)
            + apply(&mut self.model, &other.model)
            + apply(&mut self.installation_date, &other.installation_date)
            + apply(&mut self.inspection_date, &other.inspection_date)
    }
}

// ==========================================
// CanonicalEntity - 规范设备
// ==========================================
// 红线: 每个真实设备只对应一条; id 在运行内及跨运行唯一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEntity {
    pub id: String,                  // 规范标识（解析键）
    pub attributes: EntityAttributes,
    pub source_row: usize,           // 首次出现的源行位置
    pub synthetic: bool,             // 是否为合成标识
}

// ==========================================
// EventAttributes - 事件属性
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventAttributes {
    pub category: Option<String>,       // 类型/类别
    pub description: Option<String>,    // 描述（症状/作业名称）
    pub severity: Option<String>,       // 严重程度
    pub technician: Option<String>,     // 作业人员
    pub duration_hours: Option<f64>,    // 作业时长（小时）
    pub worker_count: Option<i64>,      // 作业人数
    pub work_order: Option<String>,     // 工单号
    pub area_name: Option<String>,      // 区域
    pub by_device: Option<String>,      // 故障部位
    pub action_taken: Option<String>,   // 处置措施
}

// ==========================================
// ChildRecord - 设备事件（故障/维修）
// ==========================================
// 红线: parent_id 必须在落库时指向已存在设备; 只追加不更新
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildRecord {
    pub parent_id: String,
    pub kind: EventKind,
    pub occurred_on: NaiveDate,
    pub attributes: EventAttributes,
    pub link_tier: LinkTier,  // 关联层级（兜底分配必须可辨识）
    pub source_row: usize,    // 在所属源序列中的位置
}
