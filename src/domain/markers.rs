// ==========================================
// 相机陷阱标注系统 - 计数器标记点位置
// ==========================================
// 存储: 小端 f32 (x, y) 对紧密排列的二进制块,空块视为无值
// 电子表格: "x,y|x,y",坐标保留 6 位小数
// ==========================================

use thiserror::Error;

/// 单个标记点占用字节数（两个 f32）
const BYTES_PER_POSITION: usize = 8;
/// 坐标分隔符
const COORDINATE_SEPARATOR: char = ',';
/// 标记点分隔符
const POSITION_SEPARATOR: char = '|';

#[derive(Error, Debug, PartialEq, Eq)]
#[error("标记点数据长度 {length} 不是 {BYTES_PER_POSITION} 的整数倍")]
pub struct MalformedMarkerBlob {
    pub length: usize,
}

/// 打包标记点坐标
pub fn pack_positions(positions: &[(f32, f32)]) -> Vec<u8> {
    let mut packed = Vec::with_capacity(positions.len() * BYTES_PER_POSITION);
    for (x, y) in positions {
        packed.extend_from_slice(&x.to_le_bytes());
        packed.extend_from_slice(&y.to_le_bytes());
    }
    packed
}

/// 解包标记点坐标
pub fn unpack_positions(packed: &[u8]) -> Result<Vec<(f32, f32)>, MalformedMarkerBlob> {
    if packed.len() % BYTES_PER_POSITION != 0 {
        return Err(MalformedMarkerBlob {
            length: packed.len(),
        });
    }

    Ok(packed
        .chunks_exact(BYTES_PER_POSITION)
        .map(|chunk| {
            let x = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let y = f32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
            (x, y)
        })
        .collect())
}

/// 二进制块 -> 电子表格文本
///
/// # 返回
/// - Ok(None): 无标记点
pub fn packed_to_spreadsheet_string(packed: &[u8]) -> Result<Option<String>, MalformedMarkerBlob> {
    let positions = unpack_positions(packed)?;
    if positions.is_empty() {
        return Ok(None);
    }

    let mut text = String::with_capacity(positions.len() * 18);
    for (index, (x, y)) in positions.iter().enumerate() {
        if index > 0 {
            text.push(POSITION_SEPARATOR);
        }
        text.push_str(&format!("{:.6}{}{:.6}", x, COORDINATE_SEPARATOR, y));
    }
    Ok(Some(text))
}

/// 电子表格文本 -> 二进制块
///
/// 空文本返回空块;任一坐标无法解析时返回 None
pub fn parse_spreadsheet_positions(text: &str) -> Option<Vec<u8>> {
    if text.trim().is_empty() {
        return Some(Vec::new());
    }

    let mut positions = Vec::new();
    for position in text.split(POSITION_SEPARATOR) {
        let (x, y) = position.split_once(COORDINATE_SEPARATOR)?;
        let x = parse_coordinate(x)?;
        let y = parse_coordinate(y)?;
        positions.push((x, y));
    }
    Some(pack_positions(&positions))
}

fn parse_coordinate(text: &str) -> Option<f32> {
    let text = text.trim();
    // 仅接受定点小数,拒绝 "inf"、"NaN"、指数形式
    let valid = !text.is_empty()
        && text
            .bytes()
            .enumerate()
            .all(|(i, b)| b.is_ascii_digit() || b == b'.' || (i == 0 && b == b'-'));
    if !valid {
        return None;
    }
    text.parse::<f32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spreadsheet_text_for_two_markers() {
        let packed = pack_positions(&[(0.25, 0.5), (0.125, 1.0)]);
        assert_eq!(packed.len(), 16);
        assert_eq!(
            packed_to_spreadsheet_string(&packed).unwrap(),
            Some("0.250000,0.500000|0.125000,1.000000".to_string())
        );
    }

    #[test]
    fn test_empty_blob_has_no_text() {
        assert_eq!(packed_to_spreadsheet_string(&[]).unwrap(), None);
        assert_eq!(parse_spreadsheet_positions("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_malformed_blob_is_reported() {
        assert_eq!(
            packed_to_spreadsheet_string(&[0, 1, 2]).unwrap_err(),
            MalformedMarkerBlob { length: 3 }
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_spreadsheet_positions("0.1").is_none());
        assert!(parse_spreadsheet_positions("0.1,abc").is_none());
        assert!(parse_spreadsheet_positions("0.1,0.2|").is_none());
        assert!(parse_spreadsheet_positions("inf,0.2").is_none());
    }

    #[test]
    fn test_parse_packs_little_endian_pairs() {
        let packed = parse_spreadsheet_positions("0.500000,0.250000").unwrap();
        assert_eq!(unpack_positions(&packed).unwrap(), vec![(0.5, 0.25)]);
    }
}
