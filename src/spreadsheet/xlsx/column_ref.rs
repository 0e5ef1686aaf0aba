// ==========================================
// 相机陷阱标注系统 - XLSX 单元格引用
// ==========================================
// 列字母 <-> 从 0 开始的列索引（26 进制,无零位）
// "A" -> 0, "Z" -> 25, "AA" -> 26
// ==========================================

/// 列索引 -> 列字母
pub fn column_name(index: usize) -> String {
    let mut letters = Vec::with_capacity(3);
    let mut remaining = index + 1;
    while remaining > 0 {
        let digit = (remaining - 1) % 26;
        letters.push(b'A' + digit as u8);
        remaining = (remaining - 1) / 26;
    }
    letters.reverse();
    // 全部为 ASCII 大写字母
    letters.into_iter().map(char::from).collect()
}

/// 单元格引用（行号从 1 开始）
pub fn cell_reference(column: usize, row: usize) -> String {
    format!("{}{}", column_name(column), row)
}

/// 单元格引用 -> 列索引
///
/// 取引用开头的字母部分（"AB12" -> 27）;没有字母时返回 None
pub fn column_index(reference: &str) -> Option<usize> {
    let mut index = 0usize;
    let mut letters = 0;
    for byte in reference.bytes() {
        let digit = match byte {
            b'A'..=b'Z' => byte - b'A',
            b'a'..=b'z' => byte - b'a',
            _ => break,
        };
        index = index.checked_mul(26)?.checked_add(usize::from(digit) + 1)?;
        letters += 1;
    }
    if letters == 0 {
        None
    } else {
        Some(index - 1)
    }
}

/// 工作表 dimension 引用 -> 列数
///
/// "A1:F100" -> 6;单格引用 "A1" -> 1
pub fn dimension_width(dimension: &str) -> Option<usize> {
    let last = match dimension.split_once(':') {
        Some((_, last)) => last,
        None => dimension,
    };
    column_index(last.trim()).map(|index| index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_name() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(27), "AB");
        assert_eq!(column_name(701), "ZZ");
        assert_eq!(column_name(702), "AAA");
    }

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("Z9"), Some(25));
        assert_eq!(column_index("AA10"), Some(26));
        assert_eq!(column_index("ZZ1"), Some(701));
        assert_eq!(column_index("AAA1"), Some(702));
        assert_eq!(column_index("12"), None);
    }

    #[test]
    fn test_name_and_index_agree() {
        for index in [0, 1, 25, 26, 51, 52, 675, 676, 16383] {
            assert_eq!(column_index(&column_name(index)), Some(index));
        }
    }

    #[test]
    fn test_dimension_width() {
        assert_eq!(dimension_width("A1:F100"), Some(6));
        assert_eq!(dimension_width("A1"), Some(1));
        assert_eq!(dimension_width("A1:AB2"), Some(28));
        assert_eq!(dimension_width(""), None);
    }

    #[test]
    fn test_cell_reference() {
        assert_eq!(cell_reference(0, 1), "A1");
        assert_eq!(cell_reference(27, 15), "AB15");
    }
}
