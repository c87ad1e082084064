use crate::core::schema::Column;

/// 按声明宽度列对齐的表格输出
///
/// 每列宽度取声明宽度/表头长度/最长内容三者的最大值, 最小为3,
/// 内容左对齐, 两侧各留一个空格。
pub struct TableFormatter;

impl TableFormatter {
    /// 表头, 分隔线, 数据行
    pub fn format_table(columns: &[Column], rows: &[Vec<String>]) -> String {
        let widths = Self::column_widths(columns, rows);
        let mut result = String::new();

        let headers: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        result.push_str(&Self::format_row(&headers, &widths));
        result.push('\n');

        let mut separator = String::from("|");
        for width in &widths {
            separator.push(' ');
            separator.push_str(&"-".repeat(*width));
            separator.push_str(" |");
        }
        result.push_str(&separator);
        result.push('\n');

        result.push_str(&Self::format_body(rows, &widths));
        result
    }

    /// 只有数据行, 安静模式用
    pub fn format_rows(columns: &[Column], rows: &[Vec<String>]) -> String {
        let widths = Self::column_widths(columns, rows);
        Self::format_body(rows, &widths)
    }

    fn format_body(rows: &[Vec<String>], widths: &[usize]) -> String {
        let mut out = String::new();
        for row in rows {
            out.push_str(&Self::format_row(row, widths));
            out.push('\n');
        }
        out
    }

    fn column_widths(columns: &[Column], rows: &[Vec<String>]) -> Vec<usize> {
        let mut widths: Vec<usize> = columns
            .iter()
            .map(|c| c.width.max(c.name.len()).max(3))
            .collect();
        for row in rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(cell.len());
                }
            }
        }
        widths
    }

    fn format_row(cells: &[String], widths: &[usize]) -> String {
        let mut line = String::from("|");
        for (i, width) in widths.iter().enumerate() {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            line.push(' ');
            line.push_str(cell);
            line.push_str(&" ".repeat(width.saturating_sub(cell.len()) + 1));
            line.push('|');
        }
        line
    }
}
